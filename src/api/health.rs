//! Health check endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

/// Individual readiness checks
#[derive(Serialize)]
pub struct ReadinessChecks {
    pub engine: CheckResult,
    pub sessions: CheckResult,
}

/// Result of a single health check
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail",
            message: Some(message.into()),
        }
    }
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - can the service take another call?
async fn ready(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let engine_check = check_engine(&state);
    let session_check = check_sessions(&state).await;

    let all_ok = engine_check.status == "ok" && session_check.status == "ok";
    let status = if all_ok { "ok" } else { "degraded" };
    let http_status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(ReadinessResponse {
            status,
            checks: ReadinessChecks {
                engine: engine_check,
                sessions: session_check,
            },
        }),
    )
}

/// Check that the speech engine is configured
fn check_engine(state: &ApiState) -> CheckResult {
    if state.config.engine.api_key.is_some() {
        CheckResult::ok()
    } else {
        CheckResult::fail("engine api key not configured")
    }
}

/// Check that the registry can admit another session
async fn check_sessions(state: &ApiState) -> CheckResult {
    let live = state.registry.count().await;
    let cap = state.config.session.max_sessions;
    if live < cap {
        CheckResult::ok()
    } else {
        CheckResult::fail(format!("at capacity: {live}/{cap} sessions"))
    }
}

/// System status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub active_sessions: usize,
    pub audio: AudioStatus,
}

/// Audio parameters peers must match
#[derive(Serialize)]
pub struct AudioStatus {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_window: usize,
    pub transport_ceiling: usize,
}

/// Get system status including session load and audio parameters
async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let audio = &state.config.audio;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        active_sessions: state.registry.count().await,
        audio: AudioStatus {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            chunk_window: audio.chunk_window,
            transport_ceiling: audio.transport_ceiling,
        },
    })
}

/// Build health router (liveness only, no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build readiness router (needs state for checks)
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/api/status", get(status))
        .with_state(state)
}
