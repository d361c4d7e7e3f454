//! HTTP surface of the relay server.
//!
//! Uses axum with optional bearer authentication on the machine-facing
//! routes (create, status). The human-facing routes (approval page, context
//! fetch, resolve) are authorized by the request's own open token so the
//! approver can follow a plain link from a browser.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use droidflow_types::{
    CreateAuthRequest, CreateAuthResponse, DroidflowError, RequestId, ResolveRequest,
    StatusResponse,
};

use crate::page;
use crate::store::RequestStore;

/// Shared state for HTTP handlers.
pub struct RelayState {
    pub store: Arc<RequestStore>,
    /// Bearer key required on machine-facing routes when set.
    pub api_key: Option<String>,
    /// Base URL embedded in open URLs (tunnel URL when active, otherwise
    /// the local listen address).
    pub public_base_url: String,
}

/// Build the relay router.
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/v1/requests", post(create_handler))
        .route("/v1/requests/{id}", get(context_handler))
        .route("/v1/requests/{id}/resolve", post(resolve_handler))
        .route("/v1/requests/{id}/status", get(status_handler))
        .route("/approve/{id}", get(page_handler))
        .with_state(state)
}

/// Serve the relay on an already-bound listener until `shutdown` flips.
///
/// Taking the listener (instead of an address) lets callers bind port 0 and
/// learn the real port before the server starts.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RelayState>,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), DroidflowError> {
    let addr = listener
        .local_addr()
        .map_err(|e| DroidflowError::Relay(format!("listener address: {e}")))?;
    info!(addr = %addr, "relay server listening");

    let app = router(state);
    let mut shutdown = shutdown;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|&v| v).await;
        })
        .await
        .map_err(|e| DroidflowError::Relay(format!("relay server error: {e}")))
}

/// Periodically expire overdue requests so correctness never depends on a
/// client polling.
pub fn spawn_sweep(
    store: Arc<RequestStore>,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_secs.max(1));
        loop {
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    store.expire_due(Utc::now());
                }
                result = shutdown.changed() => {
                    // A closed channel means the relay is going away too.
                    if result.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Check the bearer key if one is configured.
fn check_auth(state: &RelayState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(ref api_key) = state.api_key else {
        return Ok(());
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let expected = format!("Bearer {api_key}");
    if !constant_time_eq(auth.as_bytes(), expected.as_bytes()) {
        return Err(ApiError(
            StatusCode::UNAUTHORIZED,
            "invalid or missing API key".into(),
        ));
    }
    Ok(())
}

/// Uniform JSON error shape.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<DroidflowError> for ApiError {
    fn from(e: DroidflowError) -> Self {
        match e {
            DroidflowError::InvalidOrExpiredToken => {
                ApiError(StatusCode::FORBIDDEN, e.to_string())
            }
            DroidflowError::Relay(ref msg) if msg.starts_with("state") => {
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            DroidflowError::Relay(_) => ApiError(StatusCode::BAD_REQUEST, e.to_string()),
            other => ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenParam {
    #[serde(default)]
    token: String,
}

fn request_id(id: Uuid) -> RequestId {
    RequestId(id)
}

async fn create_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<CreateAuthRequest>,
) -> Result<Json<CreateAuthResponse>, ApiError> {
    check_auth(&state, &headers)?;

    let issued = state.store.create(&body, Utc::now())?;
    let open_url = format!(
        "{}/approve/{}?token={}",
        state.public_base_url.trim_end_matches('/'),
        issued.record.id,
        issued.open_token,
    );

    Ok(Json(CreateAuthResponse {
        request_id: issued.record.id,
        open_url,
        poll_token: issued.poll_token,
        expires_at: issued.record.expires_at,
    }))
}

async fn context_handler(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<TokenParam>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .store
        .fetch_open(request_id(id), &params.token, Utc::now())?;

    // Context view for API clients rendering their own page; token hashes
    // stay server-side.
    Ok(Json(json!({
        "request_id": record.id,
        "session_id": record.session_id,
        "step": record.step,
        "capability": record.capability,
        "instruction": record.instruction,
        "current_app": record.current_app,
        "created_at": record.created_at,
        "expires_at": record.expires_at,
        "status": record.status,
    })))
}

async fn page_handler(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<TokenParam>,
) -> impl IntoResponse {
    match state
        .store
        .fetch_open(request_id(id), &params.token, Utc::now())
    {
        Ok(record) => (StatusCode::OK, Html(page::render(&record, &params.token))),
        Err(e) => {
            warn!(request_id = %id, error = %e, "approval page fetch refused");
            (
                StatusCode::FORBIDDEN,
                Html("<html><body><p>This authorization link is invalid or expired.</p></body></html>".to_string()),
            )
        }
    }
}

async fn resolve_handler(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<TokenParam>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .store
        .resolve(request_id(id), &params.token, body, Utc::now())?;
    Ok(Json(json!({
        "request_id": record.id,
        "status": record.status,
        "decided_at": record.decided_at,
    })))
}

async fn status_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(params): Query<TokenParam>,
) -> Result<Json<StatusResponse>, ApiError> {
    check_auth(&state, &headers)?;

    let record = state
        .store
        .status(request_id(id), &params.token, Utc::now())?;
    Ok(Json(StatusResponse {
        status: record.status,
        decided_at: record.decided_at,
        message: record.decision_message,
        artifact: record.artifact,
    }))
}
