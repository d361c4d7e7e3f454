//! Human-authorization handoff data model and wire DTOs.
//!
//! A [`AuthRequestRecord`] is the relay server's durable view of one
//! human-auth request. It carries only SHA-256 hashes of the two
//! request-scoped secrets: the **open token** (authorizes the human-facing
//! approval page and the decision submission) and the **poll token**
//! (authorizes the automation bridge's status queries). The two tokens are
//! generated independently and are never exchangeable for each other.
//!
//! Status is monotonic: `pending` transitions exactly once to `approved`,
//! `rejected`, or `timeout`, and never leaves a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capability::Capability;
use crate::ids::{RequestId, SessionId};

// ---------------------------------------------------------------------------
// Core model
// ---------------------------------------------------------------------------

/// Lifecycle state of a human-auth request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// Waiting for a human decision.
    Pending,
    /// A human approved the request.
    Approved,
    /// A human rejected the request.
    Rejected,
    /// The request expired with no decision.
    Timeout,
}

impl AuthStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// The human's verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthVerdict {
    Approve,
    Reject,
}

/// Human-supplied data attached to an approval, as stored by the relay.
///
/// Application is driven by the payload kind, never by the capability tag:
/// `text` is typed into the focused field, `geo` goes to the location
/// simulation channel, `image` is pushed into shared storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelegationArtifact {
    /// Free-form text for typed-field injection.
    Text { value: String },
    /// Coordinate pair for location injection.
    Geo { lat: f64, lon: f64 },
    /// Image stored under the relay's artifacts directory.
    Image { path: PathBuf, extension: String },
}

/// Context the task loop hands to the bridge when suspending on an auth action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequestContext {
    pub session_id: SessionId,
    pub step: u32,
    pub capability: Capability,
    pub instruction: String,
    /// Foreground app at the time of the request, when known.
    pub current_app: Option<String>,
    pub timeout_secs: u64,
}

/// Durable record of one human-auth request, owned by the relay server.
///
/// Plaintext tokens are never part of this record; only their SHA-256
/// hashes are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequestRecord {
    pub id: RequestId,
    pub session_id: SessionId,
    pub step: u32,
    pub capability: Capability,
    pub instruction: String,
    pub current_app: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: AuthStatus,
    /// SHA-256 hex hash of the open token.
    pub open_token_hash: String,
    /// SHA-256 hex hash of the poll token.
    pub poll_token_hash: String,
    /// When the terminal transition happened.
    pub decided_at: Option<DateTime<Utc>>,
    /// Optional message the approver left with the decision.
    pub decision_message: Option<String>,
    /// Artifact attached to an approval, if any.
    pub artifact: Option<DelegationArtifact>,
}

/// What the bridge returns to the task loop after the wait ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthDecision {
    pub request_id: RequestId,
    pub approved: bool,
    pub status: AuthStatus,
    pub message: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub artifact: Option<DelegationArtifact>,
}

impl AuthDecision {
    /// A synthetic timeout decision, used when the poll budget is exhausted
    /// or the wait is abandoned before the relay reports a terminal status.
    pub fn timed_out(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            approved: false,
            status: AuthStatus::Timeout,
            message: Some(message.into()),
            decided_at: None,
            artifact: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Body of `POST /v1/requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuthRequest {
    pub capability: Capability,
    pub instruction: String,
    pub session_id: SessionId,
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_app: Option<String>,
    pub timeout_secs: u64,
}

/// Response to `POST /v1/requests`. The open token is embedded in
/// `open_url`; the poll token is returned once and never again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuthResponse {
    pub request_id: RequestId,
    pub open_url: String,
    pub poll_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Artifact payload as submitted by the approval page. Images travel as
/// base64 and are written to disk by the relay before being recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSubmission {
    Text { value: String },
    Geo { lat: f64, lon: f64 },
    Image { data: String, extension: String },
}

/// Body of `POST /v1/requests/{id}/resolve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub decision: AuthVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactSubmission>,
}

/// Response to `GET /v1/requests/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: AuthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<DelegationArtifact>,
}
