//! `POST /pipeline/refresh`: recompute every output from the full raw store.
//!
//! Invoked by an external scheduler. Each call loads a raw snapshot, runs the
//! pure pipeline over it and swaps the output tables, all under one
//! transaction-scoped lock.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::error_response;
use crate::pipeline::RefreshSummary;
use crate::store::refresh_snapshot;
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new().route("/pipeline/refresh", post(handler))
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    run_id: Uuid,
    #[serde(flatten)]
    summary: RefreshSummary,
}

async fn handler(State((pool, _config)): State<(PgPool, Config)>) -> impl IntoResponse {
    // ---
    let run_id = Uuid::new_v4();
    info!("POST /pipeline/refresh - run {}", run_id);

    let summary = match refresh_snapshot(&pool, run_id).await {
        Ok(summary) => summary,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to refresh pipeline output",
                &e,
            )
        }
    };

    info!("Refresh {} complete: {:?}", run_id, summary);
    (StatusCode::OK, Json(RefreshResponse { run_id, summary })).into_response()
}
