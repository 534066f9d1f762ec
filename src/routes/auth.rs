use axum::http::StatusCode;
use axum::{extract::State, Json};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{password, AuthenticatedUser};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User, ACCOUNT_TYPE_FREE};
use crate::schema::users::dsl;
use crate::state::AppState;

use super::to_iso;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    // Omit to keep the current company; send "" to clear it.
    #[serde(default)]
    pub company: Option<Option<String>>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub account_type: String,
    pub subscription_status: Option<String>,
    pub payment_status: Option<String>,
    pub created_at: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::bad_request("a valid email is required"));
    }
    if payload.password.chars().count() < 8 {
        return Err(AppError::bad_request("password must be at least 8 characters"));
    }
    let first_name = payload.first_name.trim();
    let last_name = payload.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::bad_request("first and last name are required"));
    }

    let password_hash = password::hash_password(&payload.password)?;
    let record = NewUser {
        id: Uuid::new_v4(),
        email,
        password_hash,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        company: normalize_company(payload.company.as_deref()),
        account_type: ACCOUNT_TYPE_FREE.to_string(),
    };

    let mut conn = state.db()?;
    let user: User = diesel::insert_into(dsl::users)
        .values(&record)
        .get_result(&mut conn)
        .map_err(|err| match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::conflict("an account with this email already exists")
            }
            other => other.into(),
        })?;

    let access_token = state.jwt.issue(user.id, &user.email, &user.account_type)?;
    tracing::info!(user_id = %user.id, "registered new account");
    Ok((
        StatusCode::CREATED,
        Json(auth_response(&state, access_token, &user)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    let mut conn = state.db()?;

    let user: Option<User> = dsl::users
        .filter(dsl::email.eq(&email))
        .first(&mut conn)
        .optional()?;
    let user = user.ok_or_else(AppError::invalid_credentials)?;

    if !password::verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::invalid_credentials());
    }

    let access_token = state.jwt.issue(user.id, &user.email, &user.account_type)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(auth_response(&state, access_token, &user)))
}

/// Trades a still-valid token for a fresh one, sliding the seven day
/// window forward. Expired tokens cannot be refreshed.
pub async fn refresh(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> AppResult<Json<TokenResponse>> {
    let access_token = state.jwt.refresh(bearer.token())?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_days * 24 * 60 * 60,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let record: User = dsl::users
        .filter(dsl::id.eq(user.user_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Json(user_response(&record)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    let first_name = normalize_name(payload.first_name.as_deref())?;
    let last_name = normalize_name(payload.last_name.as_deref())?;
    let company = payload
        .company
        .map(|value| normalize_company(value.as_deref()));
    if first_name.is_none() && last_name.is_none() && company.is_none() {
        return Err(AppError::bad_request("nothing to update"));
    }

    #[derive(AsChangeset)]
    #[diesel(table_name = crate::schema::users)]
    struct ProfileChanges {
        first_name: Option<String>,
        last_name: Option<String>,
        company: Option<Option<String>>,
    }

    let changes = ProfileChanges {
        first_name,
        last_name,
        company,
    };

    let mut conn = state.db()?;
    let record: User = diesel::update(dsl::users.filter(dsl::id.eq(user.user_id)))
        .set((&changes, dsl::updated_at.eq(diesel::dsl::now)))
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Json(user_response(&record)))
}

fn normalize_name(value: Option<&str>) -> Result<Option<String>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("names must not be empty"));
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

fn normalize_company(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|company| !company.is_empty())
        .map(String::from)
}

fn auth_response(state: &AppState, access_token: String, user: &User) -> AuthResponse {
    AuthResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_days * 24 * 60 * 60,
        user: user_response(user),
    }
}

pub(crate) fn user_response(user: &User) -> UserResponse {
    UserResponse {
        id: user.id,
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        company: user.company.clone(),
        account_type: user.account_type.clone(),
        subscription_status: user.subscription_status.clone(),
        payment_status: user.payment_status.clone(),
        created_at: to_iso(user.created_at),
    }
}
