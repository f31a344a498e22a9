//! Route gateway: merges every subrouter and attaches the shared
//! `(PgPool, Config)` state.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;

use crate::Config;

mod health;
mod ingest;
mod refresh;
mod views;

// ---

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .merge(ingest::router())
        .merge(refresh::router())
        .merge(views::router())
        .merge(health::router())
        .with_state((pool, config))
}

/// Log `err` and turn it into a JSON error response.
fn error_response(status: StatusCode, message: &str, err: &anyhow::Error) -> Response {
    // ---
    tracing::error!("{}: {:#}", message, err);
    (status, Json(json!({ "error": message }))).into_response()
}
