pub mod jwt;
pub mod password;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Identity extracted from a verified bearer token. Handlers that take this
/// as an argument only run for signed-in users.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub account_type: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized("missing bearer token"))?;
        let claims = state.jwt.verify(bearer.token())?;
        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            account_type: claims.account_type,
        })
    }
}
