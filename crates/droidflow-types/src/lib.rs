//! Shared types for the droidflow runtime.
//!
//! Everything that crosses a crate boundary lives here: the agent action
//! model, authorization capabilities, the human-auth request data model and
//! its wire DTOs, runtime configuration, and the shared error taxonomy.

pub mod action;
pub mod capability;
pub mod config;
pub mod error;
pub mod handoff;
pub mod ids;

pub use action::AgentAction;
pub use capability::Capability;
pub use config::RuntimeConfig;
pub use error::DroidflowError;
pub use handoff::{
    AuthDecision, AuthRequestContext, AuthRequestRecord, AuthStatus, AuthVerdict,
    ArtifactSubmission, CreateAuthRequest, CreateAuthResponse, DelegationArtifact,
    ResolveRequest, StatusResponse,
};
pub use ids::{RequestId, SessionId};
