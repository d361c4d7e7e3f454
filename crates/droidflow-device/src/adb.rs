//! ADB-backed execution target.
//!
//! Drives a device or emulator by shelling out to the `adb` binary.
//! Screenshots come from `exec-out screencap -p`, input from `input
//! tap/swipe/text/keyevent`, app launches from `monkey`, and location
//! injection from the emulator console (`adb emu geo fix`).
//!
//! Inputs are validated before they reach a shell: typed text is escaped
//! for `input text`, key event names and package names are restricted to
//! safe character sets.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use droidflow_types::config::DeviceConfig;
use droidflow_types::AgentAction;

use crate::adapter::{ExecutionTarget, Observation};
use crate::error::DeviceError;

/// Maximum bytes accepted from a single adb invocation (16 MB covers
/// full-resolution screenshots with headroom).
const MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Device-side directory where pushed delegation images land.
pub const SHARED_IMAGE_DIR: &str = "/sdcard/Pictures/droidflow";

/// ADB-backed implementation of [`ExecutionTarget`].
pub struct AdbTarget {
    adb_path: String,
    serial: Option<String>,
    scripts_dir: PathBuf,
}

impl AdbTarget {
    /// Create a target from device configuration.
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            adb_path: config.adb_path.clone(),
            serial: config.serial.clone(),
            scripts_dir: config.scripts_dir.clone(),
        }
    }

    /// Run `adb [-s serial] <args>` and return stdout bytes.
    async fn exec(&self, args: &[&str]) -> Result<Vec<u8>, DeviceError> {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(ref serial) = self.serial {
            cmd.args(["-s", serial]);
        }
        cmd.args(args);
        cmd.stdin(Stdio::null());

        let cmd_str = args.join(" ");
        debug!(command = %cmd_str, "adb exec");

        let output = cmd.output().await.map_err(|e| DeviceError::Unavailable {
            reason: format!("failed to run {}: {e}", self.adb_path),
        })?;

        if !output.status.success() {
            return Err(DeviceError::CommandFailed {
                command: cmd_str,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.len() > MAX_OUTPUT_BYTES {
            return Err(DeviceError::CommandFailed {
                command: cmd_str,
                stderr: format!("output exceeded {MAX_OUTPUT_BYTES} bytes"),
            });
        }
        Ok(output.stdout)
    }

    /// Run an adb command and return trimmed stdout as a string.
    async fn exec_text(&self, args: &[&str]) -> Result<String, DeviceError> {
        let stdout = self.exec(args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Best-effort foreground app lookup via `dumpsys window`.
    async fn foreground_app(&self) -> Option<String> {
        match self
            .exec_text(&["shell", "dumpsys", "window", "displays"])
            .await
        {
            Ok(dump) => parse_foreground_app(&dump),
            Err(e) => {
                debug!(error = %e, "foreground app lookup failed");
                None
            }
        }
    }

    /// Stream a script's contents through `adb shell`.
    async fn run_script(&self, name: &str) -> Result<String, DeviceError> {
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(DeviceError::InvalidInput {
                reason: format!("script name contains unsafe characters: {name:?}"),
            });
        }

        let mut path = self.scripts_dir.join(name);
        if !path.is_file() {
            path = self.scripts_dir.join(format!("{name}.sh"));
        }
        let script = std::fs::read_to_string(&path).map_err(|_| DeviceError::ScriptNotFound {
            name: name.to_string(),
        })?;

        let mut cmd = Command::new(&self.adb_path);
        if let Some(ref serial) = self.serial {
            cmd.args(["-s", serial]);
        }
        cmd.arg("shell");
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| DeviceError::Unavailable {
            reason: format!("failed to run {}: {e}", self.adb_path),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(|e| DeviceError::Staging(format!("failed to feed script: {e}")))?;
            // Closing stdin lets the device-side shell reach EOF and exit.
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(|e| DeviceError::Unavailable {
            reason: format!("script shell did not complete: {e}"),
        })?;
        if !output.status.success() {
            return Err(DeviceError::CommandFailed {
                command: format!("run_script {name}"),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(format!("script {name} completed"))
    }
}

#[async_trait]
impl ExecutionTarget for AdbTarget {
    async fn capture(&self) -> Result<Observation, DeviceError> {
        let screenshot_png = self.exec(&["exec-out", "screencap", "-p"]).await?;
        let foreground_app = self.foreground_app().await;
        Ok(Observation {
            screenshot_png,
            foreground_app,
            captured_at: Utc::now(),
        })
    }

    async fn apply(&self, action: &AgentAction) -> Result<String, DeviceError> {
        match action {
            AgentAction::Tap { x, y } => {
                if *x < 0 || *y < 0 {
                    return Err(DeviceError::InvalidInput {
                        reason: format!("negative tap coordinates ({x},{y})"),
                    });
                }
                self.exec(&["shell", "input", "tap", &x.to_string(), &y.to_string()])
                    .await?;
                Ok(format!("tapped ({x},{y})"))
            }

            AgentAction::Swipe { x1, y1, x2, y2, duration_ms } => {
                self.exec(&[
                    "shell",
                    "input",
                    "swipe",
                    &x1.to_string(),
                    &y1.to_string(),
                    &x2.to_string(),
                    &y2.to_string(),
                    &duration_ms.to_string(),
                ])
                .await?;
                Ok(format!("swiped ({x1},{y1})->({x2},{y2})"))
            }

            AgentAction::TypeText { text } => {
                let escaped = escape_input_text(text);
                self.exec(&["shell", "input", "text", &escaped]).await?;
                Ok(format!("typed {} chars", text.chars().count()))
            }

            AgentAction::KeyEvent { key } => {
                if !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(DeviceError::InvalidInput {
                        reason: format!("unsafe key event name: {key:?}"),
                    });
                }
                self.exec(&["shell", "input", "keyevent", key.as_str()]).await?;
                Ok(format!("sent key {key}"))
            }

            AgentAction::LaunchApp { package } => {
                if !package
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
                {
                    return Err(DeviceError::InvalidInput {
                        reason: format!("unsafe package name: {package:?}"),
                    });
                }
                self.exec(&[
                    "shell",
                    "monkey",
                    "-p",
                    package.as_str(),
                    "-c",
                    "android.intent.category.LAUNCHER",
                    "1",
                ])
                .await?;
                Ok(format!("launched {package}"))
            }

            AgentAction::Shell { command } => {
                let out = self.exec_text(&["shell", command.as_str()]).await?;
                let summary = if out.is_empty() {
                    "shell ok".to_string()
                } else {
                    format!("shell ok: {}", truncate(&out, 200))
                };
                Ok(summary)
            }

            AgentAction::RunScript { name } => self.run_script(name).await,

            AgentAction::Wait { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs(*seconds)).await;
                Ok(format!("waited {seconds}s"))
            }

            AgentAction::RequestHumanAuth { .. } | AgentAction::Finish { .. } => {
                Err(DeviceError::InvalidInput {
                    reason: "loop control action routed to the device adapter".into(),
                })
            }
        }
    }

    async fn push_file(&self, bytes: &[u8], dest: &str) -> Result<(), DeviceError> {
        if !dest.starts_with('/') {
            return Err(DeviceError::InvalidInput {
                reason: format!("push destination must be absolute: {dest:?}"),
            });
        }

        // adb push needs a local file; stage the bytes in a uniquely-named
        // temp file and remove it afterwards.
        let staging = std::env::temp_dir().join(format!("droidflow-push-{}", Uuid::new_v4()));
        std::fs::write(&staging, bytes)
            .map_err(|e| DeviceError::Staging(format!("failed to stage push file: {e}")))?;

        if let Some(parent) = std::path::Path::new(dest).parent() {
            let parent = parent.to_string_lossy();
            self.exec(&["shell", "mkdir", "-p", parent.as_ref()]).await?;
        }

        let staging_str = staging.to_string_lossy();
        let result = self.exec(&["push", staging_str.as_ref(), dest]).await;
        if let Err(e) = std::fs::remove_file(&staging) {
            debug!(error = %e, "failed to remove staging file");
        }
        result?;

        // Nudge the media scanner so the file shows up in gallery pickers.
        let scan = self
            .exec(&[
                "shell",
                "am",
                "broadcast",
                "-a",
                "android.intent.action.MEDIA_SCANNER_SCAN_FILE",
                "-d",
                &format!("file://{dest}"),
            ])
            .await;
        if let Err(e) = scan {
            warn!(error = %e, "media scanner broadcast failed");
        }
        Ok(())
    }

    async fn set_location(&self, lat: f64, lon: f64) -> Result<(), DeviceError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(DeviceError::InvalidInput {
                reason: format!("coordinates out of range: ({lat}, {lon})"),
            });
        }
        // The emulator console takes longitude first.
        self.exec(&["emu", "geo", "fix", &lon.to_string(), &lat.to_string()])
            .await?;
        Ok(())
    }
}

/// Escape text for `adb shell input text`.
///
/// Spaces become `%s`; shell metacharacters are backslash-escaped so the
/// device-side shell passes them through to the input service literally.
fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '\'' | '"' | '`' | '\\' | '&' | '|' | ';' | '(' | ')' | '<' | '>' | '$' | '*'
            | '~' | '#' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Pull the focused app package out of `dumpsys window displays` output.
///
/// Looks for `mCurrentFocus=Window{... com.example.app/...}` and returns the
/// package component.
fn parse_foreground_app(dump: &str) -> Option<String> {
    for line in dump.lines() {
        let line = line.trim();
        let Some(rest) = line
            .strip_prefix("mCurrentFocus=Window{")
            .or_else(|| line.strip_prefix("mFocusedWindow=Window{"))
        else {
            continue;
        };
        // Window{<hash> <user> com.pkg/com.pkg.Activity}
        let inner = rest.trim_end_matches('}');
        let last = inner.split_whitespace().last()?;
        let package = last.split('/').next()?;
        if package.contains('.') {
            return Some(package.to_string());
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}
