//! Read and delete endpoints for no-signup study sessions, plus the
//! client IP resolution the public rate limiter keys on.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::ephemeral::EphemeralSession;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct PublicSessionResponse {
    pub id: Uuid,
    pub name: String,
    pub cards: Value,
    pub transcript: String,
    pub created_at: DateTime<Utc>,
}

impl From<EphemeralSession> for PublicSessionResponse {
    fn from(session: EphemeralSession) -> Self {
        Self {
            id: session.id,
            name: session.name,
            cards: session.cards,
            transcript: session.transcript,
            created_at: session.created_at,
        }
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PublicSessionResponse>> {
    let session = state
        .public_sessions
        .get(id)
        .ok_or_else(|| AppError::not_found("session not found"))?;
    Ok(Json(session.into()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.public_sessions.delete(id) {
        return Err(AppError::not_found("session not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Resolves the caller's IP, preferring proxy headers over the socket
/// peer so the limiter still works behind a load balancer.
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    peer.map(|addr| addr.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}
