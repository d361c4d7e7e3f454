//! End-to-end tests for the task loop: suspension on a real relay,
//! resumption after human decisions, timeout continuation, step capping,
//! and cross-session isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use common::{parse_open_url, CapturingNotifier, RecordingTarget, ScriptedModel, TestRelay};
use droidflow::agent::{JsonlTrace, TaskRunner, TaskStatus};
use droidflow::bridge::{HumanAuthBridge, RelayClient};
use droidflow::types::config::AgentConfig;
use droidflow::types::{AgentAction, AuthStatus, Capability, SessionId};

const FAST_POLL: Duration = Duration::from_millis(50);

struct LoopHarness {
    runner: TaskRunner,
    target: Arc<RecordingTarget>,
    notifier: Arc<CapturingNotifier>,
    traces_dir: TempDir,
    stop_tx: tokio::sync::watch::Sender<bool>,
}

fn harness(relay: &TestRelay, actions: Vec<AgentAction>, max_steps: u32) -> LoopHarness {
    let target = Arc::new(RecordingTarget::default());
    let notifier = Arc::new(CapturingNotifier::default());
    let traces_dir = tempfile::tempdir().expect("should create temp dir");

    let client = RelayClient::new(&relay.base_url, None).expect("should build relay client");
    let bridge = Arc::new(HumanAuthBridge::new(
        client,
        Arc::clone(&notifier) as Arc<dyn droidflow::bridge::Notifier>,
        FAST_POLL,
    ));

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let runner = TaskRunner::new(
        Arc::clone(&target) as Arc<dyn droidflow::device::ExecutionTarget>,
        Arc::new(ScriptedModel::new(actions)),
        bridge,
        Arc::new(JsonlTrace::new(traces_dir.path().to_path_buf())),
        AgentConfig {
            max_steps,
            history_window: 8,
            traces_dir: traces_dir.path().to_path_buf(),
        },
        60,
        stop_rx,
    );

    LoopHarness { runner, target, notifier, traces_dir, stop_tx }
}

fn trace_content(dir: &TempDir, session_id: SessionId) -> String {
    std::fs::read_to_string(dir.path().join(format!("{session_id}.jsonl")))
        .expect("trace file should exist")
}

/// Resolve the next captured open URL with the given body after a delay.
fn resolve_after(
    notifier: Arc<CapturingNotifier>,
    base_url: String,
    delay: Duration,
    body: serde_json::Value,
) {
    tokio::spawn(async move {
        let url = notifier.wait_for_url().await;
        tokio::time::sleep(delay).await;
        let (id, token) = parse_open_url(&url);
        reqwest::Client::new()
            .post(format!("{base_url}/v1/requests/{id}/resolve"))
            .query(&[("token", token.as_str())])
            .json(&body)
            .send()
            .await
            .expect("resolve should reach the relay");
    });
}

#[tokio::test]
async fn camera_rejection_resumes_the_loop_with_a_rejection_line() {
    let relay = TestRelay::start(None).await;
    let mut h = harness(
        &relay,
        vec![
            AgentAction::RequestHumanAuth {
                capability: Capability::Camera,
                instruction: "Take the verification photo".into(),
                timeout_secs: Some(60),
            },
            AgentAction::Finish { success: false, message: "camera denied".into() },
        ],
        10,
    );

    // Human rejects within 5 seconds of a 60-second budget.
    resolve_after(
        Arc::clone(&h.notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "reject", "message": "no photos today" }),
    );

    let outcome = h.runner.run("verify identity").await;

    assert_eq!(outcome.auth_outcomes.len(), 1);
    assert_eq!(
        outcome.auth_outcomes[0].status,
        AuthStatus::Rejected,
        "a prompt rejection must never degrade to timeout"
    );

    // The loop resumed and saw the rejection in history, then finished.
    assert_eq!(outcome.status, TaskStatus::FinishedFailed);
    assert_eq!(outcome.steps, 2);

    let trace = trace_content(&h.traces_dir, outcome.session_id);
    assert!(trace.contains("human_auth_rejected"));
    assert!(trace.contains("no photos today"));

    relay.shutdown();
}

#[tokio::test]
async fn sms_timeout_is_a_history_event_not_an_abort() {
    let relay = TestRelay::start(None).await;
    let mut h = harness(
        &relay,
        vec![
            AgentAction::RequestHumanAuth {
                capability: Capability::Sms,
                instruction: "Forward the SMS code".into(),
                timeout_secs: Some(1),
            },
            AgentAction::Tap { x: 10, y: 10 },
            AgentAction::Finish { success: false, message: "proceeded without code".into() },
        ],
        10,
    );

    // Nobody answers.
    let outcome = h.runner.run("sms flow").await;

    assert_eq!(outcome.auth_outcomes[0].status, AuthStatus::Timeout);
    assert_eq!(outcome.steps, 3, "the loop must keep stepping after a timeout");
    assert_eq!(outcome.status, TaskStatus::FinishedFailed);

    let trace = trace_content(&h.traces_dir, outcome.session_id);
    assert!(trace.contains("human_auth_timeout"));

    // The timed-out request delegated nothing.
    assert!(h.target.typed().is_empty());

    relay.shutdown();
}

#[tokio::test]
async fn concurrent_sessions_receive_only_their_own_decisions() {
    let relay = TestRelay::start(None).await;

    let auth_then_finish = |instruction: &str| {
        vec![
            AgentAction::RequestHumanAuth {
                capability: Capability::TwoFactor,
                instruction: instruction.into(),
                timeout_secs: Some(30),
            },
            AgentAction::Finish { success: true, message: "done".into() },
        ]
    };

    let mut a = harness(&relay, auth_then_finish("code for alpha"), 10);
    let mut b = harness(&relay, auth_then_finish("code for beta"), 10);

    resolve_after(
        Arc::clone(&a.notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "approve", "artifact": { "kind": "text", "value": "AAA111" } }),
    );
    resolve_after(
        Arc::clone(&b.notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "approve", "artifact": { "kind": "text", "value": "BBB222" } }),
    );

    let (outcome_a, outcome_b) =
        tokio::join!(a.runner.run("task alpha"), b.runner.run("task beta"));

    assert_eq!(outcome_a.status, TaskStatus::FinishedOk);
    assert_eq!(outcome_b.status, TaskStatus::FinishedOk);
    assert_ne!(
        outcome_a.auth_outcomes[0].request_id,
        outcome_b.auth_outcomes[0].request_id
    );

    // Isolation: each session's target saw only its own delegation.
    assert_eq!(a.target.typed(), vec!["AAA111".to_string()]);
    assert_eq!(b.target.typed(), vec!["BBB222".to_string()]);

    relay.shutdown();
}

#[tokio::test]
async fn step_cap_holds_end_to_end() {
    let relay = TestRelay::start(None).await;
    // The model only ever taps; nothing terminates the task but the cap.
    let mut h = harness(
        &relay,
        vec![
            AgentAction::Tap { x: 1, y: 1 },
            AgentAction::Tap { x: 2, y: 2 },
            AgentAction::Tap { x: 3, y: 3 },
            AgentAction::Tap { x: 4, y: 4 },
        ],
        3,
    );

    let outcome = h.runner.run("tap forever").await;

    assert_eq!(outcome.steps, 3, "must terminate at exactly max_steps");
    assert_eq!(outcome.status, TaskStatus::FinishedFailed);
    assert_eq!(h.target.applied.lock().unwrap().len(), 3);

    relay.shutdown();
}

#[tokio::test]
async fn stop_signal_terminates_a_suspended_task() {
    let relay = TestRelay::start(None).await;
    let mut h = harness(
        &relay,
        vec![AgentAction::RequestHumanAuth {
            capability: Capability::Biometric,
            instruction: "Touch the sensor".into(),
            timeout_secs: Some(600),
        }],
        10,
    );

    let stop_tx = h.stop_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = stop_tx.send(true);
    });

    let started = std::time::Instant::now();
    let outcome = h.runner.run("long wait").await;

    assert!(
        started.elapsed() < Duration::from_secs(5),
        "stop must end a suspended task promptly, got {:?}",
        started.elapsed()
    );
    assert_eq!(outcome.status, TaskStatus::Stopped);

    relay.shutdown();
}
