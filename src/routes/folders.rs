use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Folder, NewFolder};
use crate::schema::folders::dsl;
use crate::state::AppState;

use super::to_iso;

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct RenameFolderRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct FolderResponse {
    pub id: Uuid,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn list_folders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<FolderResponse>>> {
    let mut conn = state.db()?;
    let folders: Vec<Folder> = dsl::folders
        .filter(dsl::user_id.eq(user.user_id))
        .order(dsl::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(folders.iter().map(folder_response).collect()))
}

pub async fn create_folder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateFolderRequest>,
) -> AppResult<Json<FolderResponse>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("folder name must not be empty"));
    }

    let record = NewFolder {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        name: name.to_string(),
    };
    let mut conn = state.db()?;
    let folder: Folder = diesel::insert_into(dsl::folders)
        .values(&record)
        .get_result(&mut conn)?;
    tracing::info!(folder_id = %folder.id, user_id = %user.user_id, "created folder");
    Ok(Json(folder_response(&folder)))
}

pub async fn rename_folder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameFolderRequest>,
) -> AppResult<Json<FolderResponse>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("folder name must not be empty"));
    }

    let mut conn = state.db()?;
    let folder: Folder =
        diesel::update(dsl::folders.filter(dsl::id.eq(id)).filter(dsl::user_id.eq(user.user_id)))
            .set((dsl::name.eq(name), dsl::updated_at.eq(diesel::dsl::now)))
            .get_result(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::not_found("folder not found"))?;
    Ok(Json(folder_response(&folder)))
}

/// Deleting a folder leaves its contents in place; their `folder_id`
/// drops to NULL through the foreign key, so they reappear at the root.
pub async fn delete_folder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let affected =
        diesel::delete(dsl::folders.filter(dsl::id.eq(id)).filter(dsl::user_id.eq(user.user_id)))
            .execute(&mut conn)?;
    if affected == 0 {
        return Err(AppError::not_found("folder not found"));
    }
    tracing::info!(folder_id = %id, user_id = %user.user_id, "deleted folder");
    Ok(StatusCode::NO_CONTENT)
}

fn folder_response(folder: &Folder) -> FolderResponse {
    FolderResponse {
        id: folder.id,
        name: folder.name.clone(),
        created_at: to_iso(folder.created_at),
        updated_at: to_iso(folder.updated_at),
    }
}
