//! Poll-until-terminal suspension logic.
//!
//! [`HumanAuthBridge::request_and_wait`] is the task loop's suspension
//! point: it blocks the calling session (and only that session) until the
//! relay reports a terminal status, the request's own timeout budget runs
//! out, or the task's stop signal fires. Polling backs off linearly up to a
//! cap and stops at the first terminal status, never after.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

use droidflow_types::{AuthDecision, AuthRequestContext, AuthStatus, CreateAuthRequest, RequestId};

use crate::client::RelayClient;
use crate::notify::Notifier;

/// The suspension seam the task loop depends on.
///
/// The production implementation is [`HumanAuthBridge`]; tests substitute
/// scripted doubles.
#[async_trait]
pub trait AuthHandoff: Send + Sync {
    /// Create a relay request for `ctx` and wait until it has a terminal
    /// decision, the timeout budget runs out, or `cancel` fires.
    async fn request_and_wait(
        &self,
        ctx: &AuthRequestContext,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
    ) -> AuthDecision;
}

/// Extra time past the request's own deadline the bridge keeps polling,
/// giving the relay's lazy expiry a chance to answer before the bridge
/// gives up locally.
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on the interval between polls.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Client-side orchestration of one human-auth request.
pub struct HumanAuthBridge {
    client: RelayClient,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
}

impl HumanAuthBridge {
    /// Create a bridge polling at `poll_interval` (linearly backed off up
    /// to a cap).
    pub fn new(client: RelayClient, notifier: Arc<dyn Notifier>, poll_interval: Duration) -> Self {
        Self { client, notifier, poll_interval }
    }

    /// Create the relay request and wait for its terminal decision.
    ///
    /// Always returns a decision: transient relay failures are retried
    /// within the request's own timeout budget and degrade to a `timeout`
    /// decision, and a stop signal abandons the wait with a `timeout`
    /// decision so the caller can terminate promptly. Errors never escape
    /// to the task loop.
    async fn wait_for_decision(
        &self,
        ctx: &AuthRequestContext,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
    ) -> AuthDecision {
        let deadline = Instant::now()
            + Duration::from_secs(ctx.timeout_secs)
            + DEADLINE_GRACE;

        // Create the request, retrying transient failures within the budget.
        let created = loop {
            match self.client.create_request(&to_create_body(ctx)).await {
                Ok(created) => break created,
                Err(e) => {
                    warn!(error = %e, "relay create failed, retrying");
                    if Instant::now() + self.poll_interval >= deadline {
                        return AuthDecision::timed_out(
                            RequestId::new(),
                            "relay unreachable for the full timeout budget",
                        );
                    }
                    if wait_or_cancel(self.poll_interval, cancel).await {
                        return AuthDecision::timed_out(
                            RequestId::new(),
                            "wait abandoned by stop signal",
                        );
                    }
                }
            }
        };

        info!(request_id = %created.request_id, capability = %ctx.capability,
            "suspended awaiting human authorization");

        // Best-effort: the operator may also be watching relay logs.
        if let Err(e) = self
            .notifier
            .send(
                &format!(
                    "Authorization needed ({}): {}",
                    ctx.capability, ctx.instruction
                ),
                Some(&created.open_url),
            )
            .await
        {
            warn!(error = %e, "failed to deliver open URL notification");
        }

        // Poll until terminal, budget exhaustion, or cancellation.
        let mut attempt: u32 = 0;
        loop {
            let interval = poll_interval_for(self.poll_interval, attempt);
            if wait_or_cancel(interval, cancel).await {
                info!(request_id = %created.request_id, "wait abandoned by stop signal");
                return AuthDecision::timed_out(
                    created.request_id,
                    "wait abandoned by stop signal",
                );
            }

            match self
                .client
                .poll_status(created.request_id, &created.poll_token)
                .await
            {
                Ok(status) if status.status.is_terminal() => {
                    info!(request_id = %created.request_id, status = %status.status,
                        "human authorization resolved");
                    return AuthDecision {
                        request_id: created.request_id,
                        approved: status.status == AuthStatus::Approved,
                        status: status.status,
                        message: status.message,
                        decided_at: status.decided_at,
                        artifact: status.artifact,
                    };
                }
                Ok(_) => {
                    // Still pending; a successful poll resets the backoff.
                    attempt = 0;
                }
                Err(e) => {
                    attempt += 1;
                    warn!(request_id = %created.request_id, error = %e, attempt,
                        "status poll failed");
                }
            }

            if Instant::now() >= deadline {
                return AuthDecision::timed_out(
                    created.request_id,
                    "no terminal status within the timeout budget",
                );
            }
        }
    }
}

#[async_trait]
impl AuthHandoff for HumanAuthBridge {
    async fn request_and_wait(
        &self,
        ctx: &AuthRequestContext,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
    ) -> AuthDecision {
        self.wait_for_decision(ctx, cancel).await
    }
}

fn to_create_body(ctx: &AuthRequestContext) -> CreateAuthRequest {
    CreateAuthRequest {
        capability: ctx.capability,
        instruction: ctx.instruction.clone(),
        session_id: ctx.session_id,
        step: ctx.step,
        current_app: ctx.current_app.clone(),
        timeout_secs: ctx.timeout_secs,
    }
}

/// Capped linear backoff: base, 1.5x, 2x, ... up to the cap.
fn poll_interval_for(base: Duration, attempt: u32) -> Duration {
    let grown = base + base.mul_f64(0.5) * attempt;
    grown.min(MAX_POLL_INTERVAL)
}

/// Sleep for `duration`, returning `true` if the stop signal fired first.
async fn wait_or_cancel(
    duration: Duration,
    cancel: &mut tokio::sync::watch::Receiver<bool>,
) -> bool {
    if *cancel.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        // Convert the watch::Ref (non-Send) to a bool inside the awaited
        // future so nothing non-Send is held across the await below.
        stopped = async { cancel.wait_for(|&stopped| stopped).await.is_ok() } => {
            if stopped {
                true
            } else {
                // Sender gone means no stop can ever arrive; finish the sleep
                // instead of spinning.
                tokio::time::sleep(duration).await;
                false
            }
        },
    }
}
