use axum::extract::{Query, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{User, ACCOUNT_TYPE_FREE, ACCOUNT_TYPE_PAID};
use crate::schema::users::dsl;
use crate::state::AppState;

use super::auth::{user_response, UserResponse};

#[derive(Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan: Option<String>,
}

#[derive(Deserialize)]
pub struct SessionStatusQuery {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub client_secret: String,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub status: String,
    pub customer_email: Option<String>,
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<CreateCheckoutRequest>>,
) -> AppResult<Json<CheckoutSessionResponse>> {
    let plan = payload
        .and_then(|Json(body)| body.plan)
        .unwrap_or_else(|| ACCOUNT_TYPE_PAID.to_string());

    let billing = state.billing()?;
    let session = billing
        .create_checkout_session(user.user_id, &user.email, &plan)
        .await?;
    info!(user_id = %user.user_id, session_id = %session.id, "created checkout session");
    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        client_secret: session.client_secret,
    }))
}

pub async fn session_status(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<SessionStatusQuery>,
) -> AppResult<Json<SessionStatusResponse>> {
    let billing = state.billing()?;
    let status = billing.checkout_session_status(&query.session_id).await?;
    Ok(Json(SessionStatusResponse {
        status: status.status,
        customer_email: status.customer_email,
    }))
}

/// Cancels the remote subscription first, then downgrades the local
/// account. If Stripe refuses, the account stays as it was.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let billing = state.billing()?;

    let subscription_id = {
        let mut conn = state.db()?;
        let record: User = dsl::users
            .filter(dsl::id.eq(user.user_id))
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        record
            .subscription_id
            .ok_or_else(|| AppError::bad_request("no active subscription to cancel"))?
    };

    billing.cancel_subscription(&subscription_id).await?;

    let mut conn = state.db()?;
    let record: User = diesel::update(dsl::users.filter(dsl::id.eq(user.user_id)))
        .set((
            dsl::account_type.eq(ACCOUNT_TYPE_FREE),
            dsl::subscription_status.eq("canceled"),
            dsl::subscription_id.eq(None::<String>),
            dsl::updated_at.eq(diesel::dsl::now),
        ))
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    info!(user_id = %user.user_id, "canceled subscription");
    Ok(Json(user_response(&record)))
}
