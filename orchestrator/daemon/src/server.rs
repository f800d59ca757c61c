//! Admin HTTP Surface
//!
//! Read-only operator endpoints over the running agent. Everything here is
//! off the conversation path: debug snapshots and exports are served from
//! the recorder's ring and the transcript store, never by talking to the
//! provider.
//!
//! # Endpoints
//!
//! - `GET /healthz`: liveness and agent state summary (unauthenticated)
//! - `GET /debug?session_id=..`: retained snapshots for a session
//! - `GET /debug?action=recent-sessions&limit=..`: recent session ids
//! - `GET /export?session_id=..&format=jsonl|csv`: transcript + snapshots
//!
//! All `/debug` and `/export` requests require `Authorization: Bearer
//! <token>` matching the configured admin token. Without a configured token
//! the admin endpoints refuse every request.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use parley_core::{ExportFormat, SessionExport, SessionId, VoiceAgent};

/// Default number of session ids returned by recent-sessions
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Shared state behind the admin routes
#[derive(Clone)]
pub struct AppState {
    agent: Arc<VoiceAgent>,
    admin_token: Option<String>,
}

impl AppState {
    /// Bundle the agent and the configured admin token
    #[must_use]
    pub fn new(agent: Arc<VoiceAgent>, admin_token: Option<String>) -> Self {
        Self { agent, admin_token }
    }
}

/// Build the admin router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/debug", get(debug_endpoint))
        .route("/export", get(export_endpoint))
        .with_state(state)
}

/// Reject requests without the configured bearer token
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.admin_token else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "admin token not configured" })),
        )
            .into_response());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid bearer token" })),
        )
            .into_response())
    }
}

async fn healthz(State(state): State<AppState>) -> Response {
    let agent_state = state.agent.state().await;
    Json(json!({
        "status": "ok",
        "connection": format!("{:?}", agent_state.connection),
        "session_active": agent_state.session_id.is_some(),
        "transcript_len": agent_state.transcript_len,
        "pending_tool_calls": agent_state.pending_tool_calls,
        "error_count": agent_state.error_count,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct DebugParams {
    session_id: Option<String>,
    action: Option<String>,
    limit: Option<usize>,
}

async fn debug_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DebugParams>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    debug!(?params, "debug query");

    match (params.action.as_deref(), &params.session_id) {
        (Some("recent-sessions"), _) => {
            let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
            let sessions = state.agent.recorder().recent_sessions(limit);
            Json(json!({ "sessions": sessions })).into_response()
        }
        (Some(other), _) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown action: {other}") })),
        )
            .into_response(),
        (None, Some(session_id)) => {
            let id = SessionId::from(session_id.as_str());
            let snapshots = state.agent.recorder().by_session(&id);
            Json(json!({ "session_id": id, "snapshots": snapshots })).into_response()
        }
        (None, None) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "session_id or action required" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    session_id: String,
    format: Option<String>,
}

async fn export_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ExportParams>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let format = match params
        .format
        .as_deref()
        .unwrap_or("jsonl")
        .parse::<ExportFormat>()
    {
        Ok(format) => format,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response();
        }
    };

    let id = SessionId::from(params.session_id.as_str());
    let export = SessionExport {
        session_id: id.clone(),
        items: state.agent.transcript().read_all(),
        snapshots: state.agent.recorder().by_session(&id),
    };

    match export.render(format) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, format.content_type())],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
