//! Chat-completion access behind a trait so handlers and tests never
//! talk to OpenAI directly.

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::error::AppError;
use crate::retry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends a system prompt plus conversation turns and returns the
    /// assistant's reply text.
    async fn converse(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String, AppError>;

    /// Single-shot variant used by the generation endpoints.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AppError> {
        self.converse(system_prompt, &[ChatTurn::user(user_prompt)])
            .await
    }
}

pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    async fn create_completion(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
    ) -> Result<Option<String>, OpenAIError> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?,
        ));
        for turn in turns {
            let message = match turn.role {
                ChatRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.as_str())
                        .build()?,
                ),
                ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.as_str())
                        .build()?,
                ),
            };
            messages.push(message);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn converse(&self, system_prompt: &str, turns: &[ChatTurn]) -> Result<String, AppError> {
        let content = retry::with_backoff(
            "openai",
            || self.create_completion(system_prompt, turns),
            // Retry dropped connections, never API rejections.
            |err| matches!(err, OpenAIError::Reqwest(_)),
        )
        .await
        .map_err(AppError::upstream)?;

        content.ok_or_else(|| AppError::upstream("model returned an empty response"))
    }
}
