use axum::extract::State;
use axum::{http::StatusCode, response::Json};
use diesel::prelude::*;
use serde_json::json;

use crate::state::AppState;

/// Liveness probe. Reports 503 when the connection pool cannot reach
/// Postgres so orchestrators stop routing traffic here.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = state
        .pool
        .get()
        .map(|mut conn| diesel::sql_query("SELECT 1").execute(&mut conn).is_ok())
        .unwrap_or(false);

    if database_ok {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "unreachable" })),
        )
    }
}
