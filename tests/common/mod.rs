//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use droidflow::bridge::{Notifier, NotifyError};
use droidflow::device::{DeviceError, ExecutionTarget, Observation};
use droidflow::model::error::ModelError;
use droidflow::model::DecisionProvider;
use droidflow::relay::http::{spawn_sweep, RelayState};
use droidflow::relay::RequestStore;
use droidflow::types::{AgentAction, RequestId};

/// A relay server bound to an ephemeral port, backed by a temp directory.
pub struct TestRelay {
    pub base_url: String,
    pub store: Arc<RequestStore>,
    pub state_path: std::path::PathBuf,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    _dir: TempDir,
}

impl TestRelay {
    /// Start a relay with an optional bearer key and a fast expiry sweep.
    pub async fn start(api_key: Option<&str>) -> Self {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let state_path = dir.path().join("requests.json");
        let store = Arc::new(
            RequestStore::open(state_path.clone(), dir.path().join("artifacts"))
                .expect("should open store"),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        spawn_sweep(Arc::clone(&store), 1, shutdown_rx.clone());

        let state = Arc::new(RelayState {
            store: Arc::clone(&store),
            api_key: api_key.map(Into::into),
            public_base_url: base_url.clone(),
        });
        tokio::spawn(droidflow::relay::serve(listener, state, shutdown_rx));

        Self {
            base_url,
            store,
            state_path,
            shutdown_tx,
            _dir: dir,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Split an open URL (`.../approve/<id>?token=<open>`) into its parts.
pub fn parse_open_url(url: &str) -> (RequestId, String) {
    let (path, query) = url.split_once('?').expect("open url should have a query");
    let id = path
        .rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
        .expect("open url should end with a request id");
    let token = query
        .strip_prefix("token=")
        .expect("open url query should carry the token")
        .to_string();
    (id, token)
}

/// Notifier that captures every message/URL pair it is asked to send.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<(String, Option<String>)>>,
}

impl CapturingNotifier {
    /// The most recently captured open URL, if any.
    pub fn last_url(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|(_, url)| url.clone())
    }

    /// Poll until a URL shows up (the bridge sends it right after create).
    pub async fn wait_for_url(&self) -> String {
        for _ in 0..100 {
            if let Some(url) = self.last_url() {
                return url;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("no open URL captured within 2s");
    }
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, message: &str, url: Option<&str>) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((message.to_string(), url.map(Into::into)));
        Ok(())
    }
}

/// Execution target double that records every call.
#[derive(Default)]
pub struct RecordingTarget {
    pub applied: Mutex<Vec<AgentAction>>,
    pub pushed: Mutex<Vec<(Vec<u8>, String)>>,
    pub locations: Mutex<Vec<(f64, f64)>>,
}

impl RecordingTarget {
    /// All text the target was asked to type, in order.
    pub fn typed(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| match a {
                AgentAction::TypeText { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ExecutionTarget for RecordingTarget {
    async fn capture(&self) -> Result<Observation, DeviceError> {
        Ok(Observation {
            screenshot_png: vec![0x89, 0x50, 0x4e, 0x47],
            foreground_app: Some("com.example.app".into()),
            captured_at: Utc::now(),
        })
    }

    async fn apply(&self, action: &AgentAction) -> Result<String, DeviceError> {
        self.applied.lock().unwrap().push(action.clone());
        Ok("ok".into())
    }

    async fn push_file(&self, bytes: &[u8], dest: &str) -> Result<(), DeviceError> {
        self.pushed
            .lock()
            .unwrap()
            .push((bytes.to_vec(), dest.to_string()));
        Ok(())
    }

    async fn set_location(&self, lat: f64, lon: f64) -> Result<(), DeviceError> {
        self.locations.lock().unwrap().push((lat, lon));
        Ok(())
    }
}

/// Decision provider that replays a fixed action sequence, then waits.
pub struct ScriptedModel {
    actions: Mutex<Vec<AgentAction>>,
}

impl ScriptedModel {
    pub fn new(actions: Vec<AgentAction>) -> Self {
        Self {
            actions: Mutex::new(actions),
        }
    }
}

#[async_trait]
impl DecisionProvider for ScriptedModel {
    async fn decide(
        &self,
        _goal: &str,
        _observation: &Observation,
        _history: &[String],
    ) -> Result<AgentAction, ModelError> {
        let mut actions = self.actions.lock().unwrap();
        if actions.is_empty() {
            Ok(AgentAction::Wait { seconds: 0 })
        } else {
            Ok(actions.remove(0))
        }
    }
}
