//! Error types for the droidflow-device crate.

use thiserror::Error;

/// Errors that can occur while driving the execution target.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Failed to spawn or talk to the adb binary.
    #[error("adb unavailable: {reason}")]
    Unavailable { reason: String },

    /// An adb command ran but exited non-zero.
    #[error("adb command failed ({command}): {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// An action carried input the adapter refuses to forward.
    #[error("invalid action input: {reason}")]
    InvalidInput { reason: String },

    /// A named script was not found or not readable.
    #[error("script not found: {name}")]
    ScriptNotFound { name: String },

    /// Local filesystem failure while staging a file for push.
    #[error("file staging failed: {0}")]
    Staging(String),
}
