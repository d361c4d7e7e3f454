//! Actions the model can take against the execution target.
//!
//! The [`AgentAction`] enum is the single decision unit of the task loop:
//! each step produces exactly one action, and dispatch is an exhaustive
//! match so new variants cannot be silently ignored.

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

fn default_swipe_duration_ms() -> u32 {
    300
}

fn default_wait_secs() -> u64 {
    2
}

/// One normalized next step decided by the model.
///
/// Serialized with an `action` tag so the model emits
/// `{"action": "tap", "x": 120, "y": 640}` style JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    /// Tap the screen at pixel coordinates.
    Tap { x: i32, y: i32 },
    /// Swipe between two points.
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        #[serde(default = "default_swipe_duration_ms")]
        duration_ms: u32,
    },
    /// Type text into the currently focused input field.
    TypeText { text: String },
    /// Send a single key event (e.g. `KEYCODE_BACK`, `KEYCODE_ENTER`).
    KeyEvent { key: String },
    /// Launch an app by package name.
    LaunchApp { package: String },
    /// Run a shell command on the device.
    Shell { command: String },
    /// Run a named script from the scripts directory on the device.
    RunScript { name: String },
    /// Suspend the task and ask a human to pass a checkpoint.
    RequestHumanAuth {
        capability: Capability,
        instruction: String,
        /// Seconds the request stays open; the runtime default applies when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
    /// Do nothing for a moment (also the normalization target for malformed
    /// model output).
    Wait {
        #[serde(default = "default_wait_secs")]
        seconds: u64,
    },
    /// Terminate the task with a final result.
    Finish { success: bool, message: String },
}

impl AgentAction {
    /// Short description used in step history and trace lines.
    pub fn describe(&self) -> String {
        match self {
            Self::Tap { x, y } => format!("tap ({x},{y})"),
            Self::Swipe { x1, y1, x2, y2, duration_ms } => {
                format!("swipe ({x1},{y1})->({x2},{y2}) {duration_ms}ms")
            }
            Self::TypeText { text } => format!("type_text {} chars", text.chars().count()),
            Self::KeyEvent { key } => format!("key_event {key}"),
            Self::LaunchApp { package } => format!("launch_app {package}"),
            Self::Shell { command } => format!("shell {command}"),
            Self::RunScript { name } => format!("run_script {name}"),
            Self::RequestHumanAuth { capability, .. } => {
                format!("request_human_auth capability={capability}")
            }
            Self::Wait { seconds } => format!("wait {seconds}s"),
            Self::Finish { success, .. } => format!("finish success={success}"),
        }
    }

    /// Whether this action suspends the task loop on a human decision.
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::RequestHumanAuth { .. })
    }
}
