//! Droidflow: local-first Android automation runtime.
//!
//! A task loop drives an Android emulator/device through a multimodal
//! language-model decision loop. When the model hits a checkpoint automation
//! cannot pass alone (2FA, camera capture, biometric prompts), the loop
//! suspends, a relay server hands the decision to a human over HTTP, and the
//! approved input is injected back into the running task.
//!
//! This root crate re-exports the workspace members; the integration tests
//! under `tests/` exercise the components together.

pub use droidflow_agent as agent;
pub use droidflow_bridge as bridge;
pub use droidflow_device as device;
pub use droidflow_model as model;
pub use droidflow_relay as relay;
pub use droidflow_types as types;
