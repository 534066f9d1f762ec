use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::notion::{self, NotionClient};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
}

#[derive(Deserialize)]
pub struct PageContentQuery {
    pub page_id: String,
}

#[derive(Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

#[derive(Serialize)]
pub struct AuthorizationStatusResponse {
    pub authorized: bool,
    pub workspace_name: Option<String>,
}

#[derive(Serialize)]
pub struct PageContentResponse {
    pub text: String,
}

pub async fn auth_url(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<AuthUrlResponse>> {
    let client = notion_client(&state)?;
    Ok(Json(AuthUrlResponse {
        url: client.authorization_url()?,
    }))
}

pub async fn callback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Json<AuthorizationStatusResponse>> {
    if query.code.trim().is_empty() {
        return Err(AppError::bad_request("code must not be empty"));
    }

    let client = notion_client(&state)?;
    let token = client.exchange_code(query.code.trim()).await?;

    let mut conn = state.db()?;
    let authorization = notion::upsert_authorization(&mut conn, user.user_id, &token)?;
    info!(
        user_id = %user.user_id,
        workspace_id = %authorization.workspace_id,
        "connected notion workspace"
    );
    Ok(Json(AuthorizationStatusResponse {
        authorized: true,
        workspace_name: authorization.workspace_name,
    }))
}

pub async fn is_authorized(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<AuthorizationStatusResponse>> {
    let mut conn = state.db()?;
    let authorization = notion::authorization_for(&mut conn, user.user_id)?;
    Ok(Json(AuthorizationStatusResponse {
        authorized: authorization.is_some(),
        workspace_name: authorization.and_then(|auth| auth.workspace_name),
    }))
}

pub async fn page_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PageContentQuery>,
) -> AppResult<Json<PageContentResponse>> {
    let client = notion_client(&state)?;

    let authorization = {
        let mut conn = state.db()?;
        notion::authorization_for(&mut conn, user.user_id)?
            .ok_or_else(|| AppError::bad_request("Notion is not connected for this account"))?
    };

    let text = client
        .page_text(&authorization.access_token, query.page_id.trim())
        .await?;
    Ok(Json(PageContentResponse { text }))
}

fn notion_client(state: &AppState) -> Result<NotionClient, AppError> {
    match (
        state.config.notion_client_id.as_deref(),
        state.config.notion_client_secret.as_deref(),
        state.config.notion_redirect_uri.as_deref(),
    ) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(NotionClient::new(
            state.http.clone(),
            client_id,
            client_secret,
            redirect_uri,
        )),
        _ => Err(AppError::config("Notion OAuth is not configured")),
    }
}
