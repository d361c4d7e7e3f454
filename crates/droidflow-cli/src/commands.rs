//! Command implementations for the droidflow CLI.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use droidflow_agent::{JsonlTrace, TaskRunner};
use droidflow_bridge::{HumanAuthBridge, NoopNotifier, Notifier, RelayClient, TelegramNotifier};
use droidflow_device::AdbTarget;
use droidflow_model::DecisionClient;
use droidflow_relay::http::{spawn_sweep, RelayState};
use droidflow_relay::{RequestStore, Tunnel};
use droidflow_types::RuntimeConfig;

/// How long to wait for a tunnel to advertise its public URL.
const TUNNEL_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the home directory layout and a default config file.
pub fn init(home: &Path) -> anyhow::Result<()> {
    let config = RuntimeConfig::default_for(home);

    for dir in [
        home.to_path_buf(),
        config.device.scripts_dir.clone(),
        config.agent.traces_dir.clone(),
        config.relay.artifacts_dir.clone(),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let config_path = home.join("droidflow.toml");
    if config_path.exists() {
        println!("config already exists at {}", config_path.display());
    } else {
        std::fs::write(&config_path, config.to_toml()?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("initialized {}", config_path.display());
    }
    Ok(())
}

/// An in-process relay: server task, sweep task, optional tunnel.
struct LocalRelay {
    base_url: String,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    tunnel: Option<Tunnel>,
    server: tokio::task::JoinHandle<()>,
}

impl LocalRelay {
    async fn start(config: &RuntimeConfig) -> anyhow::Result<Self> {
        let store = Arc::new(RequestStore::open(
            config.relay.state_path.clone(),
            config.relay.artifacts_dir.clone(),
        )?);

        let listener = tokio::net::TcpListener::bind(&config.relay.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.relay.listen_addr))?;
        let local_url = format!("http://{}", listener.local_addr()?);

        // A tunnel's URL wins; an explicitly configured public URL is next;
        // the local listen address is the fallback.
        let mut tunnel = None;
        let public_base_url = if !config.relay.tunnel_command.is_empty() {
            let t = Tunnel::spawn(
                &config.relay.tunnel_command,
                &local_url,
                TUNNEL_STARTUP_TIMEOUT,
            )
            .await?;
            let url = t.public_url.clone();
            tunnel = Some(t);
            url
        } else {
            config
                .relay
                .public_url
                .clone()
                .unwrap_or_else(|| local_url.clone())
        };

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        spawn_sweep(
            Arc::clone(&store),
            config.relay.sweep_interval_secs,
            shutdown_rx.clone(),
        );

        let state = Arc::new(RelayState {
            store,
            api_key: config.relay.api_key.clone(),
            public_base_url,
        });
        let server = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                if let Err(e) = droidflow_relay::serve(listener, state, shutdown_rx).await {
                    warn!(error = %e, "relay server exited with error");
                }
            }
        });

        Ok(Self {
            base_url: local_url,
            shutdown_tx,
            tunnel,
            server,
        })
    }

    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(tunnel) = self.tunnel {
            tunnel.shutdown().await;
        }
        let _ = self.server.await;
    }
}

/// Wire a stop signal to Ctrl-C.
fn stop_on_ctrl_c() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop signal received");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Run one task to completion.
pub async fn run_task(home: &Path, goal: &str, max_steps: Option<u32>) -> anyhow::Result<()> {
    let mut config = RuntimeConfig::load_or_default(home)?;
    if let Some(max) = max_steps {
        config.agent.max_steps = max;
    }

    // Use an already-running relay when configured; otherwise run one
    // in-process for the duration of the task.
    let (relay_base, local_relay) = match config.relay.external_url.clone() {
        Some(url) => (url, None),
        None => {
            let relay = LocalRelay::start(&config).await?;
            (relay.base_url.clone(), Some(relay))
        }
    };

    let notifier: Arc<dyn Notifier> = match config.notify {
        Some(ref notify) => Arc::new(TelegramNotifier::new(notify.chat_id)?),
        None => Arc::new(NoopNotifier),
    };

    let target = Arc::new(AdbTarget::new(&config.device));
    let model = Arc::new(DecisionClient::new(config.model.clone())?);
    let relay_client = RelayClient::new(&relay_base, config.relay.api_key.clone())?;
    let bridge = Arc::new(HumanAuthBridge::new(
        relay_client,
        notifier,
        Duration::from_secs(config.relay.poll_interval_secs),
    ));
    let trace = Arc::new(JsonlTrace::new(config.agent.traces_dir.clone()));

    let stop = stop_on_ctrl_c();
    let mut runner = TaskRunner::new(
        target,
        model,
        bridge,
        trace,
        config.agent.clone(),
        config.relay.default_timeout_secs,
        stop,
    );

    let outcome = runner.run(goal).await;

    println!("session:  {}", outcome.session_id);
    println!("status:   {}", outcome.status);
    println!("steps:    {}", outcome.steps);
    println!("result:   {}", outcome.message);
    for auth in &outcome.auth_outcomes {
        println!("auth:     {} -> {}", auth.request_id, auth.status);
    }

    if let Some(relay) = local_relay {
        relay.shutdown().await;
    }
    Ok(())
}

/// Run the relay server in the foreground until Ctrl-C.
pub async fn relay_serve(home: &Path, listen: Option<String>) -> anyhow::Result<()> {
    let mut config = RuntimeConfig::load_or_default(home)?;
    if let Some(listen) = listen {
        config.relay.listen_addr = listen;
    }

    let relay = LocalRelay::start(&config).await?;
    println!("relay listening on {}", relay.base_url);
    if let Some(ref tunnel) = relay.tunnel {
        println!("public URL: {}", tunnel.public_url);
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down relay");
    relay.shutdown().await;
    Ok(())
}

/// List adb-visible devices.
pub async fn list_devices(home: &Path) -> anyhow::Result<()> {
    let config = RuntimeConfig::load_or_default(home)?;
    let output = tokio::process::Command::new(&config.device.adb_path)
        .args(["devices", "-l"])
        .output()
        .await
        .with_context(|| format!("failed to run {}", config.device.adb_path))?;

    if !output.status.success() {
        anyhow::bail!(
            "adb devices failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    print!("{}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}
