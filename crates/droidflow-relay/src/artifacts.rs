//! Delegation artifact intake: validation and binary storage.
//!
//! Text and geo payloads are recorded inline on the request; image payloads
//! arrive base64-encoded, are size- and extension-checked, and are written
//! under the artifacts directory as `<request-id>-<timestamp>.<ext>` so the
//! bridge can read them back by path.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use tracing::info;

use droidflow_types::{ArtifactSubmission, DelegationArtifact, DroidflowError, RequestId};

/// Maximum decoded artifact size (10 MB).
const MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

/// Maximum extension length after sanitization.
const MAX_EXTENSION_LEN: usize = 5;

/// Turn a wire submission into the stored artifact form.
pub fn intake(
    artifacts_dir: &Path,
    request_id: RequestId,
    submission: ArtifactSubmission,
    now: DateTime<Utc>,
) -> Result<DelegationArtifact, DroidflowError> {
    match submission {
        ArtifactSubmission::Text { value } => Ok(DelegationArtifact::Text { value }),

        ArtifactSubmission::Geo { lat, lon } => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(DroidflowError::Relay(format!(
                    "coordinates out of range: ({lat}, {lon})"
                )));
            }
            Ok(DelegationArtifact::Geo { lat, lon })
        }

        ArtifactSubmission::Image { data, extension } => {
            let extension = validate_extension(&extension)?;
            let bytes = B64
                .decode(data.trim())
                .map_err(|e| DroidflowError::Relay(format!("invalid base64 image: {e}")))?;
            if bytes.is_empty() {
                return Err(DroidflowError::Relay("empty image payload".into()));
            }
            if bytes.len() > MAX_ARTIFACT_BYTES {
                return Err(DroidflowError::Relay(format!(
                    "image exceeds {MAX_ARTIFACT_BYTES} bytes"
                )));
            }

            let path = artifact_path(artifacts_dir, request_id, &extension, now);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DroidflowError::Relay(format!("artifacts dir: {e}")))?;
            }
            std::fs::write(&path, &bytes)
                .map_err(|e| DroidflowError::Relay(format!("artifact write: {e}")))?;

            info!(request_id = %request_id, path = %path.display(), bytes = bytes.len(),
                "delegation image stored");
            Ok(DelegationArtifact::Image { path, extension })
        }
    }
}

/// Deterministic artifact filename: request id + UTC timestamp + extension.
fn artifact_path(
    artifacts_dir: &Path,
    request_id: RequestId,
    extension: &str,
    now: DateTime<Utc>,
) -> PathBuf {
    artifacts_dir.join(format!(
        "{request_id}-{}.{extension}",
        now.format("%Y%m%dT%H%M%S")
    ))
}

/// Restrict extensions to short lowercase alphanumeric suffixes.
fn validate_extension(extension: &str) -> Result<String, DroidflowError> {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(DroidflowError::Relay(format!(
            "invalid artifact extension: {extension:?}"
        )));
    }
    Ok(ext)
}
