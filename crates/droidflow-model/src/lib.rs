//! Model decision client: one observation in, exactly one action out.
//!
//! [`DecisionProvider`] is the seam the task loop depends on;
//! [`client::DecisionClient`] implements it against the Anthropic and
//! OpenAI chat APIs with the screenshot attached as an image block.
//! Unparseable model output is normalized to a `wait` action, never
//! propagated as fatal.

pub mod client;
pub mod error;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;

use droidflow_device::Observation;
use droidflow_types::AgentAction;

use crate::error::ModelError;

/// The decision seam between the task loop and any model backend.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Decide the single next action for the given goal, observation, and
    /// bounded history window.
    async fn decide(
        &self,
        goal: &str,
        observation: &Observation,
        history: &[String],
    ) -> Result<AgentAction, ModelError>;
}

pub use client::DecisionClient;
pub use error::ModelError as Error;
