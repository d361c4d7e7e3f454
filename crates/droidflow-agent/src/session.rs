//! Per-task session state.

use serde::{Deserialize, Serialize};

use droidflow_types::SessionId;

/// Terminal and non-terminal states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    FinishedOk,
    FinishedFailed,
    Stopped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::FinishedOk => "finished_ok",
            Self::FinishedFailed => "finished_failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// State for one user-initiated goal, owned exclusively by its runner.
///
/// History keeps every line for the trace; the model prompt only ever sees
/// the bounded tail from [`window`](Self::window).
#[derive(Debug)]
pub struct TaskSession {
    pub id: SessionId,
    pub goal: String,
    /// Number of steps issued so far.
    pub step: u32,
    pub status: TaskStatus,
    history: Vec<String>,
    window_size: usize,
}

impl TaskSession {
    /// Start a new session for `goal`.
    pub fn new(goal: impl Into<String>, window_size: usize) -> Self {
        Self {
            id: SessionId::new(),
            goal: goal.into(),
            step: 0,
            status: TaskStatus::Running,
            history: Vec::new(),
            window_size: window_size.max(1),
        }
    }

    /// Append one history line.
    pub fn record(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
    }

    /// The bounded tail the model prompt consumes.
    pub fn window(&self) -> &[String] {
        let start = self.history.len().saturating_sub(self.window_size);
        &self.history[start..]
    }

    /// Full history, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Transition to a terminal status. A session finalizes exactly once;
    /// later calls are ignored so the first terminal condition wins.
    pub fn finalize(&mut self, status: TaskStatus) {
        if self.status == TaskStatus::Running {
            self.status = status;
        }
    }
}
