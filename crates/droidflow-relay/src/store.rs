//! Durable store of human-auth requests.
//!
//! The store is the sole owner of request state. Every mutation goes
//! through a method that takes an explicit `now`, so expiry is a pure
//! state-transition function applied on every read path (and by the
//! periodic sweep) rather than a behavior that depends on a background
//! task actually running.
//!
//! Persistence is a JSON file keyed by request id, written atomically
//! (temp file + rename) after each mutation and loaded on startup for
//! crash recovery. Plaintext tokens never reach this file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use droidflow_types::{
    AuthRequestRecord, AuthStatus, AuthVerdict, CreateAuthRequest, DroidflowError, RequestId,
    ResolveRequest,
};

use crate::artifacts;
use crate::token;

/// Bounds on a request's own timeout budget.
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// A freshly created request together with its two plaintext tokens.
///
/// The tokens exist only in this value and in the HTTP response that
/// carries them to their single consumers; the store keeps hashes.
#[derive(Debug)]
pub struct IssuedRequest {
    pub record: AuthRequestRecord,
    pub open_token: String,
    pub poll_token: String,
}

/// Mutex-guarded request map with JSON persistence.
///
/// The single lock makes each request id single-writer-at-a-time: two
/// racing decisions serialize, the first wins, and the second fails the
/// pending-status check.
pub struct RequestStore {
    state_path: PathBuf,
    artifacts_dir: PathBuf,
    inner: Mutex<HashMap<RequestId, AuthRequestRecord>>,
}

impl RequestStore {
    /// Open the store, loading any existing state file.
    pub fn open(state_path: PathBuf, artifacts_dir: PathBuf) -> Result<Self, DroidflowError> {
        let requests = match std::fs::read_to_string(&state_path) {
            Ok(content) => match serde_json::from_str::<HashMap<RequestId, AuthRequestRecord>>(
                &content,
            ) {
                Ok(map) => {
                    info!(count = map.len(), path = %state_path.display(), "relay state loaded");
                    map
                }
                Err(e) => {
                    warn!(error = %e, path = %state_path.display(),
                        "relay state file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(DroidflowError::Relay(format!(
                    "failed to read {}: {e}",
                    state_path.display()
                )))
            }
        };

        Ok(Self {
            state_path,
            artifacts_dir,
            inner: Mutex::new(requests),
        })
    }

    /// Create a new pending request, returning the record and both tokens.
    pub fn create(
        &self,
        req: &CreateAuthRequest,
        now: DateTime<Utc>,
    ) -> Result<IssuedRequest, DroidflowError> {
        let timeout_secs = req.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);

        let open_token = token::generate_token();
        let poll_token = token::generate_token();
        debug_assert_ne!(open_token, poll_token);

        let record = AuthRequestRecord {
            id: RequestId::new(),
            session_id: req.session_id,
            step: req.step,
            capability: req.capability,
            instruction: req.instruction.clone(),
            current_app: req.current_app.clone(),
            created_at: now,
            expires_at: now + Duration::seconds(timeout_secs as i64),
            status: AuthStatus::Pending,
            open_token_hash: token::hash_token(&open_token),
            poll_token_hash: token::hash_token(&poll_token),
            decided_at: None,
            decision_message: None,
            artifact: None,
        };

        let mut map = self.lock();
        map.insert(record.id, record.clone());
        self.persist(&map)?;

        info!(request_id = %record.id, session_id = %record.session_id,
            capability = %record.capability, timeout_secs, "auth request created");

        Ok(IssuedRequest { record, open_token, poll_token })
    }

    /// Fetch a request for the approval page (open-token scope).
    ///
    /// Applies the lazy expiry transition first so the page never shows a
    /// stale `pending`.
    pub fn fetch_open(
        &self,
        id: RequestId,
        open_token: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthRequestRecord, DroidflowError> {
        let mut map = self.lock();
        let record = map.get_mut(&id).ok_or(DroidflowError::InvalidOrExpiredToken)?;
        if !token::verify_token(open_token, &record.open_token_hash) {
            return Err(DroidflowError::InvalidOrExpiredToken);
        }
        if apply_expiry(record, now) {
            let snapshot = record.clone();
            self.persist(&map)?;
            return Ok(snapshot);
        }
        Ok(record.clone())
    }

    /// Record a human decision (open-token scope). The first valid decision
    /// wins; anything else fails with `InvalidOrExpiredToken` and mutates
    /// nothing.
    pub fn resolve(
        &self,
        id: RequestId,
        open_token: &str,
        resolve: ResolveRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthRequestRecord, DroidflowError> {
        let mut map = self.lock();
        let record = map.get_mut(&id).ok_or(DroidflowError::InvalidOrExpiredToken)?;
        if !token::verify_token(open_token, &record.open_token_hash) {
            return Err(DroidflowError::InvalidOrExpiredToken);
        }

        // A decision that arrives after the deadline finds the request
        // already timed out; persist that transition and refuse.
        if apply_expiry(record, now) {
            self.persist(&map)?;
            return Err(DroidflowError::InvalidOrExpiredToken);
        }
        if record.status.is_terminal() {
            return Err(DroidflowError::InvalidOrExpiredToken);
        }

        // Validate and store the artifact before touching the status so an
        // invalid payload leaves the request pending and retryable.
        let artifact = match (&resolve.decision, resolve.artifact) {
            (AuthVerdict::Approve, Some(submission)) => {
                Some(artifacts::intake(&self.artifacts_dir, id, submission, now)?)
            }
            _ => None,
        };

        record.status = match resolve.decision {
            AuthVerdict::Approve => AuthStatus::Approved,
            AuthVerdict::Reject => AuthStatus::Rejected,
        };
        record.decided_at = Some(now);
        record.decision_message = resolve.message;
        record.artifact = artifact;

        let snapshot = record.clone();
        self.persist(&map)?;

        info!(request_id = %id, status = %snapshot.status, "auth request resolved");
        Ok(snapshot)
    }

    /// Poll a request's status (poll-token scope). Idempotent: beyond the
    /// lazy expiry transition it never mutates state, and repeated calls on
    /// a terminal request return the same snapshot.
    pub fn status(
        &self,
        id: RequestId,
        poll_token: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthRequestRecord, DroidflowError> {
        let mut map = self.lock();
        let record = map.get_mut(&id).ok_or(DroidflowError::InvalidOrExpiredToken)?;
        if !token::verify_token(poll_token, &record.poll_token_hash) {
            return Err(DroidflowError::InvalidOrExpiredToken);
        }
        if apply_expiry(record, now) {
            let snapshot = record.clone();
            self.persist(&map)?;
            return Ok(snapshot);
        }
        Ok(record.clone())
    }

    /// Expire every overdue pending request. Called by the periodic sweep;
    /// returns how many requests transitioned.
    pub fn expire_due(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        let mut expired = 0;
        for record in map.values_mut() {
            if apply_expiry(record, now) {
                expired += 1;
            }
        }
        if expired > 0 {
            if let Err(e) = self.persist(&map) {
                warn!(error = %e, "failed to persist after expiry sweep");
            }
            info!(count = expired, "expired overdue auth requests");
        }
        expired
    }

    /// Number of requests currently pending (given `now`).
    pub fn pending_count(&self, now: DateTime<Utc>) -> usize {
        let map = self.lock();
        map.values()
            .filter(|r| r.status == AuthStatus::Pending && now < r.expires_at)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, AuthRequestRecord>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomic write (temp file + rename) of the full request map.
    fn persist(
        &self,
        map: &HashMap<RequestId, AuthRequestRecord>,
    ) -> Result<(), DroidflowError> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DroidflowError::Relay(format!("state dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| DroidflowError::Relay(format!("state serialize: {e}")))?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)
            .map_err(|e| DroidflowError::Relay(format!("state write: {e}")))?;
        std::fs::rename(&tmp_path, &self.state_path)
            .map_err(|e| DroidflowError::Relay(format!("state rename: {e}")))?;
        Ok(())
    }
}

/// The expiry transition: `pending` past its deadline becomes `timeout`.
///
/// Returns `true` when the record transitioned. Terminal states are left
/// untouched, which is what makes repeated polls idempotent.
fn apply_expiry(record: &mut AuthRequestRecord, now: DateTime<Utc>) -> bool {
    if record.status == AuthStatus::Pending && now >= record.expires_at {
        record.status = AuthStatus::Timeout;
        record.decided_at = Some(now);
        record.decision_message = Some("expired with no decision".into());
        return true;
    }
    false
}
