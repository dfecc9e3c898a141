//! REST endpoints for contact lookup, sequence advancement, and maintenance.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::contacts::NewContact;
use crate::error::EngineError;
use crate::outreach::Outreach;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub outreach: Arc<Outreach>,
}

/// Body of `POST /api/contacts/{email}/advance`.
#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    /// Subject actually used when the step being recorded is step 1.
    #[serde(default)]
    pub subject: Option<String>,
}

/// Build the Axum router.
pub fn api_routes(outreach: Arc<Outreach>) -> Router {
    let state = ApiState { outreach };

    Router::new()
        .route("/health", get(health))
        .route("/api/contacts", post(add_contact))
        .route("/api/contacts/{email}", get(get_contact))
        .route("/api/contacts/{email}/advance", post(advance_contact))
        .route("/api/contacts/{email}/call", post(mark_call_completed))
        .route("/api/maintenance/run", post(run_maintenance))
        .route("/api/maintenance/daily", post(run_daily_maintenance))
        .with_state(state)
}

/// HTTP status for an engine error.
pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::InvalidState { .. } => StatusCode::CONFLICT,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::ConfigMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::UnknownSequence(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::TransientIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: EngineError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(error = %error, "Request failed");
    } else {
        debug!(error = %error, "Request rejected");
    }
    (status, Json(serde_json::json!({"error": error.to_string()}))).into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "outreach-engine",
        "store_connected": state.outreach.store.is_some(),
    }))
}

// ── Contacts ────────────────────────────────────────────────────────────

async fn add_contact(State(state): State<ApiState>, Json(new): Json<NewContact>) -> Response {
    match state.outreach.sequences.add_contact(new).await {
        Ok(contact) => (StatusCode::CREATED, Json(serde_json::json!(contact))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_contact(State(state): State<ApiState>, Path(email): Path<String>) -> Response {
    let store = match state.outreach.sequences.store() {
        Ok(store) => Arc::clone(store),
        Err(e) => return error_response(e),
    };

    match state.outreach.cache.lookup(store.as_ref(), &email).await {
        Ok(Some(cached)) => Json(serde_json::json!(cached)).into_response(),
        Ok(None) => error_response(EngineError::NotFound {
            entity: "contact".into(),
            id: email,
        }),
        Err(e) => error_response(e),
    }
}

async fn advance_contact(
    State(state): State<ApiState>,
    Path(email): Path<String>,
    Json(req): Json<AdvanceRequest>,
) -> Response {
    match state
        .outreach
        .sequences
        .advance_contact(&email, req.subject.as_deref())
        .await
    {
        Ok(contact) => Json(serde_json::json!(contact)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn mark_call_completed(State(state): State<ApiState>, Path(email): Path<String>) -> Response {
    match state.outreach.sequences.mark_call_completed(&email).await {
        Ok(contact) => Json(serde_json::json!(contact)).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Maintenance ─────────────────────────────────────────────────────────

async fn run_maintenance(State(state): State<ApiState>) -> Response {
    match state.outreach.scheduler.run_maintenance().await {
        Ok(report) => Json(serde_json::json!(report)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn run_daily_maintenance(State(state): State<ApiState>) -> Response {
    match state
        .outreach
        .scheduler
        .run_maintenance_if_not_run_today()
        .await
    {
        Ok(outcome) => Json(serde_json::json!(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}
