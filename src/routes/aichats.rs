use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::ai::{ChatRole, ChatTurn};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::generate::chat_system_prompt;
use crate::models::{AiChat, NewAiChat, Upload};
use crate::repo::{self, OwnedCollection};
use crate::state::{AppState, DbConnection};

use super::collections::ResourceResponse;

const GENERIC_SYSTEM_PROMPT: &str =
    "You are a study assistant helping a student. Answer clearly and concisely.";

#[derive(Deserialize)]
pub struct CreateChatRequest {
    pub message: String,
    pub name: Option<String>,
    pub transcript: Option<String>,
    pub upload_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ContinueChatRequest {
    pub message: String,
}

pub async fn create_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateChatRequest>,
) -> AppResult<(StatusCode, Json<ResourceResponse>)> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }

    let ai = state.ai()?;
    let (system_prompt, upload_id) = {
        let mut conn = state.db()?;
        if let Some(folder) = payload.folder_id {
            repo::ensure_folder_owned(&mut conn, user.user_id, folder)?;
        }
        let inline = payload
            .transcript
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        match payload.upload_id {
            Some(upload_id) => {
                let upload = Upload::find(&mut conn, user.user_id, upload_id)?;
                let transcript = inline.unwrap_or(upload.transcript);
                (chat_system_prompt(&transcript), Some(upload_id))
            }
            None => match inline {
                Some(transcript) => (chat_system_prompt(&transcript), None),
                None => (GENERIC_SYSTEM_PROMPT.to_string(), None),
            },
        }
    };

    let mut turns = vec![ChatTurn::user(message)];
    let reply = ai.converse(&system_prompt, &turns).await?;
    turns.push(ChatTurn::assistant(reply));

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_chat_name(message));

    use crate::schema::ai_chats::dsl;
    let record = NewAiChat {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        upload_id,
        name,
        messages: turns_to_json(&turns),
        folder_id: payload.folder_id,
    };
    let mut conn = state.db()?;
    let row: AiChat = diesel::insert_into(dsl::ai_chats)
        .values(&record)
        .get_result(&mut conn)?;
    info!(chat_id = %row.id, user_id = %user.user_id, "started chat");
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn continue_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContinueChatRequest>,
) -> AppResult<Json<ResourceResponse>> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }

    let ai = state.ai()?;
    let (mut turns, system_prompt) = {
        let mut conn = state.db()?;
        let chat = AiChat::find(&mut conn, user.user_id, id)?;
        let turns = turns_from_json(&chat.messages)?;
        // The linked upload may have been deleted since; the chat keeps
        // working with a generic prompt in that case.
        let system_prompt = match chat.upload_id {
            Some(upload_id) => upload_transcript(&mut conn, user.user_id, upload_id)?
                .map(|transcript| chat_system_prompt(&transcript))
                .unwrap_or_else(|| GENERIC_SYSTEM_PROMPT.to_string()),
            None => GENERIC_SYSTEM_PROMPT.to_string(),
        };
        (turns, system_prompt)
    };

    turns.push(ChatTurn::user(message));
    let reply = ai.converse(&system_prompt, &turns).await?;
    turns.push(ChatTurn::assistant(reply));

    use crate::schema::ai_chats::dsl;
    let mut conn = state.db()?;
    let row: AiChat = diesel::update(
        dsl::ai_chats
            .filter(dsl::id.eq(id))
            .filter(dsl::user_id.eq(user.user_id)),
    )
    .set(dsl::messages.eq(turns_to_json(&turns)))
    .get_result(&mut conn)
    .optional()?
    .ok_or_else(|| AppError::not_found("chat not found"))?;
    Ok(Json(row.into()))
}

fn upload_transcript(
    conn: &mut DbConnection,
    owner: Uuid,
    upload_id: Uuid,
) -> Result<Option<String>, AppError> {
    use crate::schema::uploads::dsl;
    Ok(dsl::uploads
        .filter(dsl::id.eq(upload_id))
        .filter(dsl::user_id.eq(owner))
        .select(dsl::transcript)
        .first::<String>(conn)
        .optional()?)
}

fn turns_to_json(turns: &[ChatTurn]) -> Value {
    Value::Array(
        turns
            .iter()
            .map(|turn| {
                json!({
                    "role": match turn.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    "content": turn.content,
                })
            })
            .collect(),
    )
}

fn turns_from_json(value: &Value) -> Result<Vec<ChatTurn>, AppError> {
    let Some(items) = value.as_array() else {
        return Err(AppError::internal("stored chat messages are corrupt"));
    };
    items
        .iter()
        .map(|item| {
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match item.get("role").and_then(Value::as_str) {
                Some("user") => Ok(ChatTurn::user(content)),
                Some("assistant") => Ok(ChatTurn::assistant(content)),
                _ => Err(AppError::internal("stored chat messages are corrupt")),
            }
        })
        .collect()
}

fn default_chat_name(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= 40 {
        return trimmed.to_string();
    }
    let mut name: String = trimmed.chars().take(40).collect();
    name.push_str("...");
    name
}
