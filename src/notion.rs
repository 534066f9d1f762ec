//! Notion OAuth flow and page import.
//!
//! The access token obtained from the OAuth code exchange is stored one
//! row per user and reused to pull page content as plain text for the
//! generation endpoints.

use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewNotionAuthorization, NotionAuthorization};
use crate::retry;
use crate::state::DbConnection;

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub workspace_id: String,
    pub workspace_name: Option<String>,
    pub bot_id: Option<String>,
    #[serde(default)]
    pub owner: Value,
}

pub struct NotionClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl NotionClient {
    pub fn new(http: reqwest::Client, client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        }
    }

    pub fn authorization_url(&self) -> Result<String, AppError> {
        let mut url = Url::parse(&format!("{NOTION_API_BASE}/oauth/authorize"))
            .map_err(AppError::internal)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("owner", "user")
            .append_pair("redirect_uri", &self.redirect_uri);
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": self.redirect_uri,
        });
        let url = format!("{NOTION_API_BASE}/oauth/token");
        let response = retry::with_backoff(
            "notion",
            || {
                self.http
                    .post(&url)
                    .basic_auth(&self.client_id, Some(&self.client_secret))
                    .json(&body)
                    .send()
            },
            retry::transport_error,
        )
        .await?;
        let response = expect_success(response).await?;
        Ok(response.json().await?)
    }

    /// Pulls every block of a page and flattens the rich text into one
    /// newline-separated string.
    pub async fn page_text(&self, access_token: &str, page_id: &str) -> Result<String, AppError> {
        #[derive(Deserialize)]
        struct BlocksPage {
            results: Vec<Value>,
            has_more: bool,
            next_cursor: Option<String>,
        }

        let url = format!("{NOTION_API_BASE}/blocks/{page_id}/children");
        let mut lines: Vec<String> = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let response = retry::with_backoff(
                "notion",
                || {
                    let mut request = self
                        .http
                        .get(&url)
                        .bearer_auth(access_token)
                        .header("Notion-Version", NOTION_VERSION)
                        .query(&[("page_size", "100")]);
                    if let Some(cursor) = &cursor {
                        request = request.query(&[("start_cursor", cursor.as_str())]);
                    }
                    request.send()
                },
                retry::transport_error,
            )
            .await?;
            let response = expect_success(response).await?;
            let page: BlocksPage = response.json().await?;

            let text = blocks_plain_text(&page.results);
            if !text.is_empty() {
                lines.push(text);
            }
            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(lines.join("\n"))
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::upstream(format!("notion returned {status}: {body}")))
}

/// Joins the `plain_text` spans of every block that carries rich text.
/// Blocks without text (images, dividers) are skipped.
pub(crate) fn blocks_plain_text(blocks: &[Value]) -> String {
    let mut lines = Vec::new();
    for block in blocks {
        let Some(block_type) = block.get("type").and_then(Value::as_str) else {
            continue;
        };
        let Some(spans) = block
            .get(block_type)
            .and_then(|body| body.get("rich_text"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        let line: String = spans
            .iter()
            .filter_map(|span| span.get("plain_text").and_then(Value::as_str))
            .collect();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

pub fn upsert_authorization(
    conn: &mut DbConnection,
    owner: Uuid,
    token: &TokenResponse,
) -> Result<NotionAuthorization, AppError> {
    use crate::schema::notion_authorizations::dsl;

    let record = NewNotionAuthorization {
        id: Uuid::new_v4(),
        user_id: owner,
        access_token: token.access_token.clone(),
        workspace_id: token.workspace_id.clone(),
        workspace_name: token.workspace_name.clone(),
        bot_id: token.bot_id.clone(),
        owner: token.owner.clone(),
    };
    Ok(diesel::insert_into(dsl::notion_authorizations)
        .values(&record)
        .on_conflict(dsl::user_id)
        .do_update()
        .set((
            dsl::access_token.eq(token.access_token.clone()),
            dsl::workspace_id.eq(token.workspace_id.clone()),
            dsl::workspace_name.eq(token.workspace_name.clone()),
            dsl::bot_id.eq(token.bot_id.clone()),
            dsl::owner.eq(token.owner.clone()),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .get_result::<NotionAuthorization>(conn)?)
}

pub fn authorization_for(
    conn: &mut DbConnection,
    owner: Uuid,
) -> Result<Option<NotionAuthorization>, AppError> {
    use crate::schema::notion_authorizations::dsl;
    Ok(dsl::notion_authorizations
        .filter(dsl::user_id.eq(owner))
        .first::<NotionAuthorization>(conn)
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn authorization_url_carries_the_oauth_params() {
        let client = NotionClient::new(
            reqwest::Client::new(),
            "client-123",
            "secret",
            "https://app.example.com/notion/callback",
        );
        let url = client.authorization_url().unwrap();
        assert!(url.starts_with("https://api.notion.com/v1/oauth/authorize?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("owner=user"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fnotion%2Fcallback"));
    }

    #[test]
    fn flattens_rich_text_blocks() {
        let blocks = vec![
            json!({
                "type": "heading_1",
                "heading_1": {"rich_text": [{"plain_text": "Photosynthesis"}]}
            }),
            json!({
                "type": "paragraph",
                "paragraph": {"rich_text": [
                    {"plain_text": "Plants convert light "},
                    {"plain_text": "into chemical energy."}
                ]}
            }),
            json!({"type": "divider", "divider": {}}),
        ];
        assert_eq!(
            blocks_plain_text(&blocks),
            "Photosynthesis\nPlants convert light into chemical energy."
        );
    }

    #[test]
    fn empty_pages_flatten_to_an_empty_string() {
        assert_eq!(blocks_plain_text(&[]), "");
        let no_text = vec![json!({"type": "image", "image": {"file": {}}})];
        assert_eq!(blocks_plain_text(&no_text), "");
    }
}
