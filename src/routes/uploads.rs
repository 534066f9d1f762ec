use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewUpload, Upload};
use crate::repo;
use crate::schema::uploads::dsl;
use crate::state::AppState;

use super::collections::ResourceResponse;

/// MIME types the upload endpoints accept.
const ALLOWED_TYPES: [&str; 4] = [
    "text/plain",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Deserialize)]
pub struct UploadTextRequest {
    pub title: Option<String>,
    pub transcript: String,
    pub folder_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct PublicUploadResponse {
    pub title: String,
    pub transcript: String,
}

struct ParsedUpload {
    title: String,
    transcript: String,
    folder_id: Option<Uuid>,
}

pub async fn upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ResourceResponse>)> {
    let parsed = read_upload(multipart).await?;

    let mut conn = state.db()?;
    if let Some(folder) = parsed.folder_id {
        repo::ensure_folder_owned(&mut conn, user.user_id, folder)?;
    }

    let record = NewUpload {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        title: parsed.title,
        transcript: parsed.transcript,
        folder_id: parsed.folder_id,
    };
    let upload: Upload = diesel::insert_into(dsl::uploads)
        .values(&record)
        .get_result(&mut conn)?;
    tracing::info!(upload_id = %upload.id, user_id = %user.user_id, "stored upload");
    Ok((StatusCode::CREATED, Json(upload.into())))
}

/// Ingests pasted or imported text without a file, the path used by the
/// Notion import and the frontend's paste box.
pub async fn upload_text(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UploadTextRequest>,
) -> AppResult<(StatusCode, Json<ResourceResponse>)> {
    let text = payload.transcript.trim();
    if text.is_empty() {
        return Err(AppError::bad_request("transcript must not be empty"));
    }
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or("Pasted text");

    let mut conn = state.db()?;
    if let Some(folder) = payload.folder_id {
        repo::ensure_folder_owned(&mut conn, user.user_id, folder)?;
    }

    let record = NewUpload {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        title: title.to_string(),
        transcript: text.to_string(),
        folder_id: payload.folder_id,
    };
    let upload: Upload = diesel::insert_into(dsl::uploads)
        .values(&record)
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(upload.into())))
}

/// Extracts text for the no-signup tier. Nothing is persisted; the
/// caller feeds the transcript straight into public generation.
pub async fn upload_public(multipart: Multipart) -> AppResult<Json<PublicUploadResponse>> {
    let parsed = read_upload(multipart).await?;
    Ok(Json(PublicUploadResponse {
        title: parsed.title,
        transcript: parsed.transcript,
    }))
}

async fn read_upload(mut multipart: Multipart) -> Result<ParsedUpload, AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;
    let mut folder_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    let msg = format!("failed to read file bytes: {err}");
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(msg)
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid title: {err}")))?;
                if !value.trim().is_empty() {
                    title = Some(value.trim().to_string());
                }
            }
            Some("folder_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid folder id: {err}")))?;
                if !value.trim().is_empty() {
                    let parsed = Uuid::parse_str(value.trim())
                        .map_err(|_| AppError::bad_request("folder_id must be a valid UUID"))?;
                    folder_id = Some(parsed);
                }
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if file_bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let file_name = file_name.ok_or_else(|| AppError::bad_request("filename is required"))?;

    let mime = resolve_content_type(content_type.as_deref(), &file_name);
    let transcript = transcript_from_bytes(&mime, &file_bytes)?;
    if transcript.trim().is_empty() {
        return Err(AppError::bad_request("file contains no text"));
    }

    Ok(ParsedUpload {
        title: title.unwrap_or_else(|| title_from_file_name(&file_name)),
        transcript,
        folder_id,
    })
}

/// Browsers sometimes send octet-stream for perfectly guessable files,
/// so the declared type only wins when it says something specific.
fn resolve_content_type(declared: Option<&str>, file_name: &str) -> String {
    match declared {
        Some(mime) if mime != "application/octet-stream" => mime.to_string(),
        _ => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}

fn transcript_from_bytes(content_type: &str, bytes: &[u8]) -> Result<String, AppError> {
    if !ALLOWED_TYPES.contains(&content_type) {
        return Err(AppError::unsupported_media(format!(
            "unsupported file type: {content_type}"
        )));
    }
    match content_type {
        "text/plain" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(AppError::unsupported_media(format!(
            "text extraction for {other} is not available; upload a .txt file or use the text endpoint"
        ))),
    }
}

fn title_from_file_name(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
        .trim();
    if stem.is_empty() {
        "Untitled upload".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn declared_content_type_wins_unless_generic() {
        assert_eq!(
            resolve_content_type(Some("text/plain"), "notes.bin"),
            "text/plain"
        );
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), "notes.txt"),
            "text/plain"
        );
        assert_eq!(resolve_content_type(None, "paper.pdf"), "application/pdf");
    }

    #[test]
    fn plain_text_is_extracted() {
        let text = transcript_from_bytes("text/plain", "cells divide".as_bytes()).unwrap();
        assert_eq!(text, "cells divide");
    }

    #[test]
    fn disallowed_types_are_rejected() {
        let err = transcript_from_bytes("image/png", &[1, 2, 3]).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn allowed_but_unextractable_types_are_rejected() {
        let err = transcript_from_bytes("application/pdf", &[1, 2, 3]).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn titles_fall_back_to_the_file_stem() {
        assert_eq!(title_from_file_name("biology-notes.txt"), "biology-notes");
        assert_eq!(title_from_file_name(""), "Untitled upload");
    }
}
