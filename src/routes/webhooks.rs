use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use tracing::info;

use crate::billing;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Stripe posts here with a signed raw body. The signature is checked
/// before the payload is even parsed; a request that fails verification
/// changes nothing.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::config("STRIPE_WEBHOOK_SECRET is not configured"))?;

    let signature = headers
        .get(billing::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::bad_request("missing stripe-signature header"))?;

    billing::verify_webhook_signature(&body, signature, secret, Utc::now().timestamp())?;

    let event = billing::parse_event(&body)?;
    info!(event_type = %event.event_type, "processing stripe webhook");

    let mut conn = state.db()?;
    billing::apply_event(&mut conn, &event)?;
    Ok(StatusCode::OK)
}
