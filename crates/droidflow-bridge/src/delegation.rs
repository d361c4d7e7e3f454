//! Applying an approved delegation artifact to the execution target.
//!
//! Application is keyed by payload kind, never by the capability tag that
//! motivated the request: text is typed into the focused field, a
//! coordinate goes to the location-simulation channel, an image is pushed
//! into shared storage. Each artifact is applied exactly once, by the
//! single call the bridge makes after its wait returns.

use tracing::{info, warn};

use droidflow_device::adb::SHARED_IMAGE_DIR;
use droidflow_device::ExecutionTarget;
use droidflow_types::{AgentAction, AuthDecision, DelegationArtifact};

/// Apply a decision's artifact to the target, returning the history lines
/// the task loop should append.
///
/// Rejections and timeouts apply nothing; the caller still records the
/// decision itself.
pub async fn apply_decision(decision: &AuthDecision, target: &dyn ExecutionTarget) -> Vec<String> {
    if !decision.approved {
        return Vec::new();
    }
    let Some(ref artifact) = decision.artifact else {
        return Vec::new();
    };

    match artifact {
        DelegationArtifact::Text { value } => {
            let action = AgentAction::TypeText { text: value.clone() };
            match target.apply(&action).await {
                Ok(_) => vec![format!(
                    "delegation_result=typed_text chars={}",
                    value.chars().count()
                )],
                Err(e) => {
                    warn!(error = %e, "text delegation failed");
                    vec![format!("delegation_result=failed error={e}")]
                }
            }
        }

        DelegationArtifact::Geo { lat, lon } => match target.set_location(*lat, *lon).await {
            Ok(()) => vec![format!("delegation_result=location_set lat={lat} lon={lon}")],
            Err(e) => {
                warn!(error = %e, "geo delegation failed");
                vec![format!("delegation_result=failed error={e}")]
            }
        },

        DelegationArtifact::Image { path, extension: _ } => {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "artifact file unreadable");
                    return vec![format!(
                        "delegation_result=failed error=artifact unreadable: {e}"
                    )];
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.png", decision.request_id));
            let dest = format!("{SHARED_IMAGE_DIR}/{file_name}");

            match target.push_file(&bytes, &dest).await {
                Ok(()) => {
                    info!(dest = %dest, bytes = bytes.len(), "delegation image pushed");
                    vec![
                        format!("delegation_result=image_pushed dest={dest}"),
                        gallery_hint(&file_name),
                    ]
                }
                Err(e) => {
                    warn!(error = %e, "image delegation failed");
                    vec![format!("delegation_result=failed error={e}")]
                }
            }
        }
    }
}

/// Deterministic picker-navigation hint appended after an image push.
///
/// Advisory only: it gives the next model step a stable path to the file,
/// but nothing enforces that the model follows it.
pub fn gallery_hint(file_name: &str) -> String {
    format!(
        "gallery_hint: the human-provided image is in Pictures/droidflow as {file_name}; \
         in a photo picker, open Browse/Albums, choose the droidflow album, \
         and select the newest item"
    )
}
