//! Runtime configuration for droidflow.
//!
//! [`RuntimeConfig`] is the top-level configuration loaded from
//! `droidflow.toml`. It is passed explicitly into every component
//! constructor; there are no ambient singletons, which keeps concurrent
//! sessions isolated and makes test doubles trivial.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DroidflowError;

/// Which LLM provider the decision client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    Anthropic,
    OpenAi,
}

/// Model decision client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider the model name belongs to.
    pub provider: ModelProvider,
    /// Model name (e.g. "claude-sonnet-4-5", "gpt-4o").
    pub model: String,
    /// Maximum completion tokens per decision.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Override for the provider API base URL (testing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

/// Execution target (ADB) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the adb binary.
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    /// Device serial for `adb -s`; `None` uses the only connected device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Directory holding named scripts for the `run_script` action.
    pub scripts_dir: PathBuf,
}

fn default_adb_path() -> String {
    "adb".into()
}

/// Human-auth relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Listen address for the relay HTTP server.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL embedded in open URLs (set by the tunnel when active).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Bearer key required on machine-facing relay routes when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of an already-running relay; when set, `run` does not start
    /// an in-process relay server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    /// Seconds between bridge status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Default request timeout when the model does not specify one.
    #[serde(default = "default_request_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Seconds between background expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Durable request store (JSON, token hashes only).
    pub state_path: PathBuf,
    /// Directory for binary delegation artifacts.
    pub artifacts_dir: PathBuf,
    /// Tunnel command to expose the relay publicly (e.g.
    /// `["cloudflared", "tunnel", "--url"]`); the local URL is appended.
    #[serde(default)]
    pub tunnel_command: Vec<String>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8477".into()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Task loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard ceiling on steps per task.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// How many recent history entries the model prompt sees.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Directory for per-session JSONL trace files.
    pub traces_dir: PathBuf,
}

fn default_max_steps() -> u32 {
    50
}

fn default_history_window() -> usize {
    8
}

/// Telegram notification settings. The bot token itself comes from the
/// `TELEGRAM_BOT_TOKEN` environment variable, never from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Chat to send open URLs to.
    pub chat_id: i64,
}

/// Top-level configuration for a droidflow runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base directory for all runtime state.
    pub home_dir: PathBuf,
    pub device: DeviceConfig,
    pub model: ModelConfig,
    pub relay: RelayConfig,
    pub agent: AgentConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyConfig>,
}

impl RuntimeConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DroidflowError> {
        toml::from_str(content).map_err(|e| DroidflowError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, DroidflowError> {
        toml::to_string_pretty(self).map_err(|e| DroidflowError::Config(e.to_string()))
    }

    /// Load from `<home>/droidflow.toml`, or fall back to defaults for the
    /// home when the file does not exist yet.
    pub fn load_or_default(home: &std::path::Path) -> Result<Self, DroidflowError> {
        let path = home.join("droidflow.toml");
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default_for(home)),
            Err(e) => Err(DroidflowError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Create a default configuration rooted at `home`.
    pub fn default_for(home: &std::path::Path) -> Self {
        Self {
            home_dir: home.to_path_buf(),
            device: DeviceConfig {
                adb_path: default_adb_path(),
                serial: None,
                scripts_dir: home.join("scripts"),
            },
            model: ModelConfig {
                provider: ModelProvider::Anthropic,
                model: "claude-sonnet-4-5".into(),
                max_tokens: default_max_tokens(),
                api_base: None,
            },
            relay: RelayConfig {
                listen_addr: default_listen_addr(),
                public_url: None,
                api_key: None,
                external_url: None,
                poll_interval_secs: default_poll_interval_secs(),
                default_timeout_secs: default_request_timeout_secs(),
                sweep_interval_secs: default_sweep_interval_secs(),
                state_path: home.join("relay").join("requests.json"),
                artifacts_dir: home.join("relay").join("artifacts"),
                tunnel_command: Vec::new(),
            },
            agent: AgentConfig {
                max_steps: default_max_steps(),
                history_window: default_history_window(),
                traces_dir: home.join("traces"),
            },
            notify: None,
        }
    }
}

/// Resolve the droidflow home directory: `DROIDFLOW_HOME` when set,
/// otherwise `~/.droidflow`.
pub fn resolve_home_dir() -> PathBuf {
    if let Ok(home) = std::env::var("DROIDFLOW_HOME") {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    let user_home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(user_home).join(".droidflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_toml_roundtrip() {
        let config = RuntimeConfig::default_for(std::path::Path::new("/tmp/droidflow"));
        let toml_str = config.to_toml().unwrap();
        let parsed = RuntimeConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.home_dir, PathBuf::from("/tmp/droidflow"));
        assert_eq!(parsed.relay.listen_addr, "127.0.0.1:8477");
        assert_eq!(parsed.agent.history_window, 8);
    }

    #[test]
    fn default_paths_derive_from_home() {
        let config = RuntimeConfig::default_for(std::path::Path::new("/data/df"));
        assert_eq!(
            config.relay.state_path,
            PathBuf::from("/data/df/relay/requests.json")
        );
        assert_eq!(config.agent.traces_dir, PathBuf::from("/data/df/traces"));
        assert_eq!(config.device.scripts_dir, PathBuf::from("/data/df/scripts"));
    }

    #[test]
    fn minimal_toml_applies_defaults() {
        let toml_str = r#"
            home_dir = "/tmp/df"

            [device]
            scripts_dir = "/tmp/df/scripts"

            [model]
            provider = "open_ai"
            model = "gpt-4o"

            [relay]
            state_path = "/tmp/df/relay/requests.json"
            artifacts_dir = "/tmp/df/relay/artifacts"

            [agent]
            traces_dir = "/tmp/df/traces"
        "#;
        let config = RuntimeConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.model.provider, ModelProvider::OpenAi);
        assert_eq!(config.relay.poll_interval_secs, 2);
        assert_eq!(config.agent.max_steps, 50);
        assert!(config.notify.is_none());
    }
}
