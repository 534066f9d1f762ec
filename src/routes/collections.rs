//! Handlers shared by every study collection. Each endpoint is stamped
//! per resource at router construction, e.g. `list::<FlashcardSession>`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{AiChat, FlashcardSession, MultipleChoiceQuiz, Summary, Upload};
use crate::repo::{self, FolderScope, OwnedCollection};
use crate::state::AppState;

use super::to_iso;

#[derive(Deserialize)]
pub struct ListQuery {
    /// `root` for unfiled items, a folder id for one folder, absent for
    /// everything.
    pub folder: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub folder_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ResourceResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
    pub created_at: String,
    #[serde(flatten)]
    pub payload: Value,
}

impl From<FlashcardSession> for ResourceResponse {
    fn from(row: FlashcardSession) -> Self {
        Self {
            id: row.id,
            name: row.name,
            upload_id: row.upload_id,
            folder_id: row.folder_id,
            created_at: to_iso(row.created_at),
            payload: json!({ "cards": row.cards }),
        }
    }
}

impl From<MultipleChoiceQuiz> for ResourceResponse {
    fn from(row: MultipleChoiceQuiz) -> Self {
        Self {
            id: row.id,
            name: row.name,
            upload_id: row.upload_id,
            folder_id: row.folder_id,
            created_at: to_iso(row.created_at),
            payload: json!({ "questions": row.questions }),
        }
    }
}

impl From<Summary> for ResourceResponse {
    fn from(row: Summary) -> Self {
        Self {
            id: row.id,
            name: row.name,
            upload_id: row.upload_id,
            folder_id: row.folder_id,
            created_at: to_iso(row.created_at),
            payload: json!({ "summary": row.body }),
        }
    }
}

impl From<AiChat> for ResourceResponse {
    fn from(row: AiChat) -> Self {
        Self {
            id: row.id,
            name: row.name,
            upload_id: row.upload_id,
            folder_id: row.folder_id,
            created_at: to_iso(row.created_at),
            payload: json!({ "messages": row.messages }),
        }
    }
}

impl From<Upload> for ResourceResponse {
    fn from(row: Upload) -> Self {
        Self {
            id: row.id,
            name: row.title,
            upload_id: None,
            folder_id: row.folder_id,
            created_at: to_iso(row.created_at),
            payload: json!({ "transcript": row.transcript }),
        }
    }
}

pub async fn list<C>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<ResourceResponse>>>
where
    C: OwnedCollection + Into<ResourceResponse>,
{
    let scope = parse_folder_scope(query.folder.as_deref())?;
    let mut conn = state.db()?;
    let rows = C::list(&mut conn, user.user_id, scope)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_one<C>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ResourceResponse>>
where
    C: OwnedCollection + Into<ResourceResponse>,
{
    let mut conn = state.db()?;
    let row = C::find(&mut conn, user.user_id, id)?;
    Ok(Json(row.into()))
}

pub async fn rename<C>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameRequest>,
) -> AppResult<Json<ResourceResponse>>
where
    C: OwnedCollection + Into<ResourceResponse>,
{
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    let mut conn = state.db()?;
    let row = C::rename(&mut conn, user.user_id, id, name)?;
    Ok(Json(row.into()))
}

pub async fn move_item<C>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MoveRequest>,
) -> AppResult<Json<ResourceResponse>>
where
    C: OwnedCollection + Into<ResourceResponse>,
{
    let mut conn = state.db()?;
    if let Some(folder) = payload.folder_id {
        repo::ensure_folder_owned(&mut conn, user.user_id, folder)?;
    }
    let row = C::move_to_folder(&mut conn, user.user_id, id, payload.folder_id)?;
    Ok(Json(row.into()))
}

pub async fn remove<C>(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode>
where
    C: OwnedCollection + Into<ResourceResponse>,
{
    let mut conn = state.db()?;
    C::delete(&mut conn, user.user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn parse_folder_scope(raw: Option<&str>) -> Result<FolderScope, AppError> {
    match raw {
        None => Ok(FolderScope::Any),
        Some("root") => Ok(FolderScope::Root),
        Some(value) => Uuid::parse_str(value)
            .map(FolderScope::In)
            .map_err(|_| AppError::bad_request("folder must be a folder id or \"root\"")),
    }
}
