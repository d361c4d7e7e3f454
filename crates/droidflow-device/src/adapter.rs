//! The execution target trait: observe state, apply one action at a time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use droidflow_types::AgentAction;

use crate::error::DeviceError;

/// One observation of the device, captured before each decision.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Raw PNG screenshot bytes.
    pub screenshot_png: Vec<u8>,
    /// Foreground app package, when it could be determined.
    pub foreground_app: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Abstraction over the controlled device.
///
/// The device is exclusively driven by one action at a time; callers never
/// issue a second action while the first is pending. Implementations return
/// a short human-readable success message from [`apply`](Self::apply) that
/// the task loop appends to step history.
#[async_trait]
pub trait ExecutionTarget: Send + Sync {
    /// Capture the current screen and foreground app.
    async fn capture(&self) -> Result<Observation, DeviceError>;

    /// Apply one ordinary action. `RequestHumanAuth` and `Finish` are loop
    /// control flow, not device actions, and return `InvalidInput` here.
    async fn apply(&self, action: &AgentAction) -> Result<String, DeviceError>;

    /// Push raw bytes into the device filesystem at `dest`.
    async fn push_file(&self, bytes: &[u8], dest: &str) -> Result<(), DeviceError>;

    /// Inject a coordinate into the device's location-simulation channel.
    async fn set_location(&self, lat: f64, lon: f64) -> Result<(), DeviceError>;
}
