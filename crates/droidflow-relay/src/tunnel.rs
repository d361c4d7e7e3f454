//! Managed tunnel subprocess for public exposure of the relay.
//!
//! Spawns the user-configured tunnel command (e.g. `cloudflared tunnel
//! --url <local>`), scans its output for the first public `https://` URL,
//! and keeps the child handle so shutdown can reap it. The tunnel is a
//! collaborator process only; none of the relay protocol depends on it.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use droidflow_types::DroidflowError;

/// A running tunnel child and the public URL it advertised.
pub struct Tunnel {
    child: Child,
    pub public_url: String,
}

impl Tunnel {
    /// Spawn `command... <local_url>` and wait up to `startup_timeout` for a
    /// public URL to appear on stdout or stderr.
    pub async fn spawn(
        command: &[String],
        local_url: &str,
        startup_timeout: Duration,
    ) -> Result<Self, DroidflowError> {
        let Some((program, args)) = command.split_first() else {
            return Err(DroidflowError::Config("tunnel command is empty".into()));
        };

        let mut child = Command::new(program)
            .args(args)
            .arg(local_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DroidflowError::Relay(format!("failed to spawn tunnel: {e}")))?;

        let (url_tx, mut url_rx) = tokio::sync::mpsc::channel::<String>(1);

        // cloudflared prints the URL on stderr, other tunnels on stdout;
        // scan both.
        if let Some(stdout) = child.stdout.take() {
            let tx = url_tx.clone();
            tokio::spawn(scan_for_url(BufReader::new(stdout), tx));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_for_url(BufReader::new(stderr), url_tx));
        }

        let public_url = tokio::time::timeout(startup_timeout, url_rx.recv())
            .await
            .map_err(|_| {
                DroidflowError::Relay(format!(
                    "tunnel produced no public URL within {startup_timeout:?}"
                ))
            })?
            .ok_or_else(|| DroidflowError::Relay("tunnel exited before advertising a URL".into()))?;

        info!(url = %public_url, "tunnel established");
        Ok(Self { child, public_url })
    }

    /// Terminate the tunnel process.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill tunnel process");
        }
        let _ = self.child.wait().await;
        info!("tunnel stopped");
    }
}

/// Read lines and forward the first `https://` token found.
async fn scan_for_url<R>(reader: BufReader<R>, tx: tokio::sync::mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "tunnel output");
        if let Some(url) = extract_https_url(&line) {
            // Receiver may be gone after the first URL; that's fine.
            let _ = tx.send(url).await;
            return;
        }
    }
}

/// Pull the first whitespace-delimited `https://` URL out of a line.
///
/// Loopback URLs are skipped so the tunnel's echo of the local target is
/// never mistaken for the public endpoint.
fn extract_https_url(line: &str) -> Option<String> {
    line.split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != ':' && c != '/' && c != '.' && c != '-'))
        .find(|tok| {
            tok.starts_with("https://")
                && !tok.contains("localhost")
                && !tok.contains("127.0.0.1")
        })
        .map(str::to_string)
}
