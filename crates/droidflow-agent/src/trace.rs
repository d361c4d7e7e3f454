//! Append-only per-session trace persistence.
//!
//! One JSONL file per session under the traces directory. Every history
//! line becomes a timestamped entry; finalization appends a closing entry
//! with the terminal status. The trace is the audit record of what the
//! automation actually did.

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::warn;

use droidflow_types::SessionId;

use crate::session::TaskStatus;

/// Where session history goes as it happens.
pub trait TraceSink: Send + Sync {
    /// Append one line to the session's trace.
    fn append(&self, session_id: SessionId, line: &str) -> Result<(), String>;

    /// Record the terminal transition.
    fn finalize(
        &self,
        session_id: SessionId,
        status: TaskStatus,
        message: &str,
    ) -> Result<(), String>;
}

/// JSONL file implementation, one `<session-id>.jsonl` per session.
pub struct JsonlTrace {
    dir: PathBuf,
}

impl JsonlTrace {
    /// Create a trace sink writing under `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn write_entry(&self, session_id: SessionId, entry: serde_json::Value) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("failed to create traces dir: {e}"))?;
        let path = self.dir.join(format!("{session_id}.jsonl"));

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("failed to open trace file: {e}"))?;

        let mut line = entry.to_string();
        line.push('\n');
        file.write_all(line.as_bytes())
            .map_err(|e| format!("failed to append trace entry: {e}"))
    }
}

impl TraceSink for JsonlTrace {
    fn append(&self, session_id: SessionId, line: &str) -> Result<(), String> {
        self.write_entry(
            session_id,
            json!({ "at": Utc::now(), "line": line }),
        )
    }

    fn finalize(
        &self,
        session_id: SessionId,
        status: TaskStatus,
        message: &str,
    ) -> Result<(), String> {
        self.write_entry(
            session_id,
            json!({
                "at": Utc::now(),
                "event": "finalized",
                "status": status,
                "message": message,
            }),
        )
    }
}

/// Trace sink that drops everything (tests, dry runs).
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn append(&self, _session_id: SessionId, _line: &str) -> Result<(), String> {
        Ok(())
    }

    fn finalize(
        &self,
        _session_id: SessionId,
        _status: TaskStatus,
        _message: &str,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Log-and-continue wrapper: the trace is an audit aid, and a full disk
/// must not kill a running task.
pub fn append_best_effort(sink: &dyn TraceSink, session_id: SessionId, line: &str) {
    if let Err(e) = sink.append(session_id, line) {
        warn!(session_id = %session_id, error = %e, "trace append failed");
    }
}
