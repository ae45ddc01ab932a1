//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::ratelimit::CounterStore;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    status: &'static str,
    rate_limit_store: &'static str,
    database: bool,
}

/// Readiness check. The counter store always serves (memory fallback);
/// the database must answer.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = match state.db.execute("SELECT 1", &[]).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Readiness database check failed");
            false
        }
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if database { "ready" } else { "degraded" },
            rate_limit_store: state.store.backend(),
            database,
        }),
    )
}
