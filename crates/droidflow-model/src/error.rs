//! Error types for the droidflow-model crate.

use thiserror::Error;

/// Errors that can occur while requesting a decision from the model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No API key was found in the environment for the configured provider.
    #[error("missing API key: set {var}")]
    MissingApiKey { var: &'static str },

    /// Transport-level failure talking to the provider.
    #[error("model request failed: {0}")]
    Http(String),

    /// The provider returned a non-success status.
    #[error("model API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    ResponseShape(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}
