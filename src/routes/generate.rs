//! AI generation endpoints. The authenticated and public tiers share
//! one prompt/parse pipeline and differ only in card count and where
//! the result lands: the database for signed-in users, the in-memory
//! session store for everyone else.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::generate::{self, AUTHENTICATED_CARD_COUNT, PUBLIC_CARD_COUNT};
use crate::models::{
    FlashcardSession, MultipleChoiceQuiz, NewFlashcardSession, NewMultipleChoiceQuiz, NewSummary,
    Summary, Upload,
};
use crate::repo::{self, OwnedCollection};
use crate::state::{AppState, DbConnection};

use super::collections::ResourceResponse;
use super::public::{client_ip, PublicSessionResponse};

#[derive(Deserialize)]
pub struct GenerateRequest {
    /// Study material sent inline. Optional when `upload_id` is given.
    pub transcript: Option<String>,
    /// Stored upload to read the transcript from and link the result to.
    pub upload_id: Option<Uuid>,
    pub folder_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct PublicGenerateRequest {
    pub transcript: String,
}

pub async fn generate_flashcards(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<ResourceResponse>)> {
    let ai = state.ai()?;
    let (transcript, upload_id) = prepare(&state, &user, &payload)?;

    let raw = ai
        .complete(&generate::flashcard_prompt(AUTHENTICATED_CARD_COUNT), &transcript)
        .await?;
    let session = generate::parse_flashcards(&raw)?;

    use crate::schema::flashcard_sessions::dsl;
    let record = NewFlashcardSession {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        upload_id,
        name: session.name,
        cards: session.payload,
        folder_id: payload.folder_id,
    };
    let mut conn = state.db()?;
    let row: FlashcardSession = diesel::insert_into(dsl::flashcard_sessions)
        .values(&record)
        .get_result(&mut conn)?;
    info!(session_id = %row.id, user_id = %user.user_id, "generated flashcards");
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn generate_quiz(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<ResourceResponse>)> {
    let ai = state.ai()?;
    let (transcript, upload_id) = prepare(&state, &user, &payload)?;

    let raw = ai
        .complete(&generate::quiz_prompt(AUTHENTICATED_CARD_COUNT), &transcript)
        .await?;
    let session = generate::parse_quiz(&raw)?;

    use crate::schema::multiple_choice_quizzes::dsl;
    let record = NewMultipleChoiceQuiz {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        upload_id,
        name: session.name,
        questions: session.payload,
        folder_id: payload.folder_id,
    };
    let mut conn = state.db()?;
    let row: MultipleChoiceQuiz = diesel::insert_into(dsl::multiple_choice_quizzes)
        .values(&record)
        .get_result(&mut conn)?;
    info!(quiz_id = %row.id, user_id = %user.user_id, "generated quiz");
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn generate_summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<GenerateRequest>,
) -> AppResult<(StatusCode, Json<ResourceResponse>)> {
    let ai = state.ai()?;
    let (transcript, upload_id) = prepare(&state, &user, &payload)?;

    let raw = ai.complete(&generate::summary_prompt(), &transcript).await?;
    let session = generate::parse_summary(&raw)?;
    let body = session
        .payload
        .as_str()
        .map(str::to_string)
        .unwrap_or_default();

    use crate::schema::summaries::dsl;
    let record = NewSummary {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        upload_id,
        name: session.name,
        body,
        folder_id: payload.folder_id,
    };
    let mut conn = state.db()?;
    let row: Summary = diesel::insert_into(dsl::summaries)
        .values(&record)
        .get_result(&mut conn)?;
    info!(summary_id = %row.id, user_id = %user.user_id, "generated summary");
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// The no-signup tier: fewer cards, in-memory persistence, and one
/// creation allowance consumed before the model is called.
pub async fn generate_flashcards_public(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<PublicGenerateRequest>,
) -> AppResult<(StatusCode, Json<PublicSessionResponse>)> {
    let transcript = payload.transcript.trim();
    if transcript.is_empty() {
        return Err(AppError::bad_request("transcript must not be empty"));
    }

    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    state.public_sessions.register_creation(ip)?;

    let ai = state.ai()?;
    let raw = ai
        .complete(&generate::flashcard_prompt(PUBLIC_CARD_COUNT), transcript)
        .await?;
    let session = generate::parse_flashcards(&raw)?;

    let stored = state
        .public_sessions
        .insert(session.name, session.payload, transcript.to_string());
    info!(session_id = %stored.id, ip = %ip, "generated public flashcards");
    Ok((StatusCode::CREATED, Json(stored.into())))
}

/// Resolves the transcript and validates the linked upload and target
/// folder before any model tokens are spent. The pooled connection is
/// released again so it is not held across the model call.
fn prepare(
    state: &AppState,
    user: &AuthenticatedUser,
    payload: &GenerateRequest,
) -> Result<(String, Option<Uuid>), AppError> {
    let mut conn = state.db()?;
    if let Some(folder) = payload.folder_id {
        repo::ensure_folder_owned(&mut conn, user.user_id, folder)?;
    }
    resolve_transcript(&mut conn, user.user_id, payload)
}

fn resolve_transcript(
    conn: &mut DbConnection,
    owner: Uuid,
    payload: &GenerateRequest,
) -> Result<(String, Option<Uuid>), AppError> {
    let inline = payload
        .transcript
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    match payload.upload_id {
        Some(upload_id) => {
            let upload = Upload::find(conn, owner, upload_id)?;
            Ok((inline.unwrap_or(upload.transcript), Some(upload_id)))
        }
        None => {
            let text = inline
                .ok_or_else(|| AppError::bad_request("transcript or upload_id is required"))?;
            Ok((text, None))
        }
    }
}
