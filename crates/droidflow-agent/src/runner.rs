//! The step loop: capture, decide, dispatch, record, repeat.
//!
//! Termination conditions (external stop, step ceiling) are checked before
//! each step is issued, and the first one to fire wins. Adapter failures
//! and model failures are recorded in history and never terminate the task;
//! only an explicit stop, step exhaustion, or a `finish` action produce a
//! terminal state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use droidflow_bridge::bridge::AuthHandoff;
use droidflow_bridge::delegation;
use droidflow_device::ExecutionTarget;
use droidflow_model::DecisionProvider;
use droidflow_types::config::AgentConfig;
use droidflow_types::{
    AgentAction, AuthRequestContext, AuthStatus, RequestId, SessionId,
};

use crate::session::{TaskSession, TaskStatus};
use crate::trace::{append_best_effort, TraceSink};

/// Resolution of one human-auth request, reported in the task outcome.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub request_id: RequestId,
    pub status: AuthStatus,
}

/// Final result of a task run.
#[derive(Debug)]
pub struct TaskOutcome {
    pub session_id: SessionId,
    pub status: TaskStatus,
    /// Steps actually issued.
    pub steps: u32,
    pub message: String,
    /// Every human-auth request this task made, with its resolution.
    /// Never silently dropped from the result.
    pub auth_outcomes: Vec<AuthOutcome>,
}

/// Drives one task session. Independent tasks use independent runners.
pub struct TaskRunner {
    target: Arc<dyn ExecutionTarget>,
    model: Arc<dyn DecisionProvider>,
    handoff: Arc<dyn AuthHandoff>,
    trace: Arc<dyn TraceSink>,
    config: AgentConfig,
    /// Applied when the model omits `timeout_secs` on an auth request.
    default_auth_timeout_secs: u64,
    stop: tokio::sync::watch::Receiver<bool>,
}

impl TaskRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: Arc<dyn ExecutionTarget>,
        model: Arc<dyn DecisionProvider>,
        handoff: Arc<dyn AuthHandoff>,
        trace: Arc<dyn TraceSink>,
        config: AgentConfig,
        default_auth_timeout_secs: u64,
        stop: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            model,
            handoff,
            trace,
            config,
            default_auth_timeout_secs,
            stop,
        }
    }

    /// Run a goal to a terminal state.
    pub async fn run(&mut self, goal: &str) -> TaskOutcome {
        let mut session = TaskSession::new(goal, self.config.history_window);
        let mut auth_outcomes: Vec<AuthOutcome> = Vec::new();
        let mut final_message = String::new();

        info!(session_id = %session.id, goal, "task started");
        append_best_effort(&*self.trace, session.id, &format!("task_started goal={goal}"));

        loop {
            // Termination checks happen before a step is issued; whichever
            // fires first wins.
            if *self.stop.borrow() {
                session.finalize(TaskStatus::Stopped);
                final_message = "stopped by external signal".into();
                break;
            }
            if session.step >= self.config.max_steps {
                session.finalize(TaskStatus::FinishedFailed);
                final_message =
                    format!("step limit reached ({} steps)", self.config.max_steps);
                break;
            }

            session.step += 1;
            let step = session.step;

            // Observe. A capture failure is an ordinary adapter failure:
            // recorded, step consumed, loop continues.
            let observation = match self.target.capture().await {
                Ok(obs) => obs,
                Err(e) => {
                    let line = format!("step {step}: capture failed: {e}");
                    warn!(session_id = %session.id, error = %e, "capture failed");
                    session.record(line.clone());
                    append_best_effort(&*self.trace, session.id, &line);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            // Decide. Transport errors are normalized to a wait, the same
            // treatment the client gives unparseable output.
            let action = match self
                .model
                .decide(&session.goal, &observation, session.window())
                .await
            {
                Ok(action) => action,
                Err(e) => {
                    warn!(session_id = %session.id, error = %e,
                        "model decision failed, normalizing to wait");
                    session.record(format!("step {step}: model error, waiting: {e}"));
                    AgentAction::Wait { seconds: 2 }
                }
            };

            // Dispatch: exhaustive over the action variant.
            match action {
                AgentAction::Finish { success, message } => {
                    let line = format!("step {step}: finish success={success} message={message}");
                    session.record(line.clone());
                    append_best_effort(&*self.trace, session.id, &line);
                    session.finalize(if success {
                        TaskStatus::FinishedOk
                    } else {
                        TaskStatus::FinishedFailed
                    });
                    final_message = message;
                    break;
                }

                AgentAction::RequestHumanAuth { capability, instruction, timeout_secs } => {
                    let line = format!(
                        "step {step}: request_human_auth capability={capability} \
                         instruction={instruction}"
                    );
                    session.record(line.clone());
                    append_best_effort(&*self.trace, session.id, &line);

                    let ctx = AuthRequestContext {
                        session_id: session.id,
                        step,
                        capability,
                        instruction,
                        current_app: observation.foreground_app.clone(),
                        timeout_secs: timeout_secs.unwrap_or(self.default_auth_timeout_secs),
                    };

                    // Suspension point: blocks this session only.
                    let decision = self.handoff.request_and_wait(&ctx, &mut self.stop).await;

                    auth_outcomes.push(AuthOutcome {
                        request_id: decision.request_id,
                        status: decision.status,
                    });

                    let decision_line = format!(
                        "human_auth_{} request_id={}{}",
                        decision.status,
                        decision.request_id,
                        decision
                            .message
                            .as_deref()
                            .map(|m| format!(" message={m}"))
                            .unwrap_or_default(),
                    );
                    session.record(decision_line.clone());
                    append_best_effort(&*self.trace, session.id, &decision_line);

                    // A timeout or rejection is information for the next
                    // decision, not a task failure.
                    for line in delegation::apply_decision(&decision, &*self.target).await {
                        session.record(line.clone());
                        append_best_effort(&*self.trace, session.id, &line);
                    }
                }

                AgentAction::Tap { .. }
                | AgentAction::Swipe { .. }
                | AgentAction::TypeText { .. }
                | AgentAction::KeyEvent { .. }
                | AgentAction::LaunchApp { .. }
                | AgentAction::Shell { .. }
                | AgentAction::RunScript { .. }
                | AgentAction::Wait { .. } => {
                    let desc = action.describe();
                    let line = match self.target.apply(&action).await {
                        Ok(result) => format!("step {step}: {desc} -> {result}"),
                        Err(e) => format!("step {step}: {desc} -> failed: {e}"),
                    };
                    session.record(line.clone());
                    append_best_effort(&*self.trace, session.id, &line);
                }
            }
        }

        // Never drop the auth history from the result.
        if !auth_outcomes.is_empty() {
            let summary = auth_outcomes
                .iter()
                .map(|o| format!("{}={}", o.request_id, o.status))
                .collect::<Vec<_>>()
                .join(", ");
            final_message = format!("{final_message} [human auth: {summary}]");
        }

        info!(session_id = %session.id, status = %session.status, steps = session.step,
            "task finished");
        if let Err(e) = self
            .trace
            .finalize(session.id, session.status, &final_message)
        {
            warn!(session_id = %session.id, error = %e, "trace finalize failed");
        }

        TaskOutcome {
            session_id: session.id,
            status: session.status,
            steps: session.step,
            message: final_message,
            auth_outcomes,
        }
    }
}
