use super::state::AppState;
use crate::session::{SessionError, SessionSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    /// Session state after the failed request, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSnapshot>,
}

fn error_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Busy(_) | SessionError::NeedsReset | SessionError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        SessionError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::ControllerGone => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn respond(state: &AppState, result: Result<SessionSnapshot, SessionError>) -> Response {
    match result {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                error!("Session request failed: {}", e);
            }
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                    session: Some(state.session.snapshot()),
                }),
            )
                .into_response()
        }
    }
}

/// GET /session
/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.snapshot()))
}

/// POST /session/start
/// Start a new recording cycle
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Start requested over HTTP");
    let result = state.session.start().await;
    respond(&state, result)
}

/// POST /session/stop
/// Stop listening early; analysis continues
pub async fn stop_session(State(state): State<AppState>) -> Response {
    info!("Stop requested over HTTP");
    let result = state.session.stop().await;
    respond(&state, result)
}

/// POST /session/reset
/// Clear a finished cycle
pub async fn reset_session(State(state): State<AppState>) -> Response {
    info!("Reset requested over HTTP");
    let result = state.session.reset().await;
    respond(&state, result)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
