//! Integration tests for the bridge: suspension, polling, and delegation
//! application against a real relay server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::json;

use common::{parse_open_url, CapturingNotifier, RecordingTarget, TestRelay};
use droidflow::bridge::{delegation, AuthHandoff, HumanAuthBridge, RelayClient};
use droidflow::types::{AuthRequestContext, AuthStatus, Capability, SessionId};

const FAST_POLL: Duration = Duration::from_millis(50);

fn bridge_for(relay: &TestRelay, notifier: Arc<CapturingNotifier>) -> HumanAuthBridge {
    let client = RelayClient::new(&relay.base_url, None).expect("should build relay client");
    HumanAuthBridge::new(client, notifier, FAST_POLL)
}

fn ctx(capability: Capability, instruction: &str, timeout_secs: u64) -> AuthRequestContext {
    AuthRequestContext {
        session_id: SessionId::new(),
        step: 1,
        capability,
        instruction: instruction.into(),
        current_app: Some("com.example.app".into()),
        timeout_secs,
    }
}

/// Resolve the captured open URL with the given JSON body after a delay.
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
async fn approve_with_text_round_trip() {
    let relay = TestRelay::start(None).await;
    let notifier = Arc::new(CapturingNotifier::default());
    let bridge = bridge_for(&relay, Arc::clone(&notifier));

    resolve_after(
        Arc::clone(&notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "approve", "artifact": { "kind": "text", "value": "hello" } }),
    );

    let (_tx, mut cancel) = tokio::sync::watch::channel(false);
    let decision = bridge
        .request_and_wait(&ctx(Capability::TwoFactor, "Enter the code", 30), &mut cancel)
        .await;

    assert!(decision.approved);
    assert_eq!(decision.status, AuthStatus::Approved);

    // Exactly one type-text call with the approved value.
    let target = RecordingTarget::default();
    delegation::apply_decision(&decision, &target).await;
    assert_eq!(target.typed(), vec!["hello".to_string()]);

    relay.shutdown();
}

#[tokio::test]
async fn approve_with_geo_round_trip() {
    let relay = TestRelay::start(None).await;
    let notifier = Arc::new(CapturingNotifier::default());
    let bridge = bridge_for(&relay, Arc::clone(&notifier));

    resolve_after(
        Arc::clone(&notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "approve",
                "artifact": { "kind": "geo", "lat": 37.7, "lon": -122.4 } }),
    );

    let (_tx, mut cancel) = tokio::sync::watch::channel(false);
    let decision = bridge
        .request_and_wait(&ctx(Capability::Location, "Share your location", 30), &mut cancel)
        .await;

    assert!(decision.approved);

    let target = RecordingTarget::default();
    delegation::apply_decision(&decision, &target).await;
    assert_eq!(target.locations.lock().unwrap().as_slice(), &[(37.7, -122.4)]);

    relay.shutdown();
}

#[tokio::test]
async fn approve_with_image_pushes_and_hints() {
    let relay = TestRelay::start(None).await;
    let notifier = Arc::new(CapturingNotifier::default());
    let bridge = bridge_for(&relay, Arc::clone(&notifier));

    let image_bytes = b"\x89PNG fake selfie".to_vec();
    resolve_after(
        Arc::clone(&notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "approve",
                "artifact": { "kind": "image",
                              "data": B64.encode(&image_bytes),
                              "extension": "png" } }),
    );

    let (_tx, mut cancel) = tokio::sync::watch::channel(false);
    let decision = bridge
        .request_and_wait(&ctx(Capability::Camera, "Take the selfie", 30), &mut cancel)
        .await;
    assert!(decision.approved);

    let target = RecordingTarget::default();
    let lines = delegation::apply_decision(&decision, &target).await;

    let pushed = target.pushed.lock().unwrap();
    assert_eq!(pushed.len(), 1, "image must be pushed exactly once");
    assert_eq!(pushed[0].0, image_bytes);
    assert!(pushed[0].1.starts_with("/sdcard/Pictures/droidflow/"));
    assert!(pushed[0].1.contains(&decision.request_id.to_string()));

    assert!(lines.iter().any(|l| l.starts_with("gallery_hint:")));

    relay.shutdown();
}

#[tokio::test]
async fn reject_within_budget_is_rejected_not_timeout() {
    let relay = TestRelay::start(None).await;
    let notifier = Arc::new(CapturingNotifier::default());
    let bridge = bridge_for(&relay, Arc::clone(&notifier));

    // Camera request with a 60s budget; the human rejects almost instantly.
    resolve_after(
        Arc::clone(&notifier),
        relay.base_url.clone(),
        Duration::from_millis(100),
        json!({ "decision": "reject", "message": "not comfortable" }),
    );

    let (_tx, mut cancel) = tokio::sync::watch::channel(false);
    let started = std::time::Instant::now();
    let decision = bridge
        .request_and_wait(&ctx(Capability::Camera, "Take a photo", 60), &mut cancel)
        .await;

    assert_eq!(decision.status, AuthStatus::Rejected);
    assert!(!decision.approved);
    assert_eq!(decision.message.as_deref(), Some("not comfortable"));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "decision must arrive promptly, not at the timeout"
    );

    // No delegation on rejection.
    let target = RecordingTarget::default();
    let lines = delegation::apply_decision(&decision, &target).await;
    assert!(lines.is_empty());
    assert!(target.typed().is_empty());

    relay.shutdown();
}

#[tokio::test]
async fn no_decision_degrades_to_timeout() {
    let relay = TestRelay::start(None).await;
    let notifier = Arc::new(CapturingNotifier::default());
    let bridge = bridge_for(&relay, Arc::clone(&notifier));

    let (_tx, mut cancel) = tokio::sync::watch::channel(false);
    let decision = bridge
        .request_and_wait(&ctx(Capability::Sms, "Forward the SMS", 1), &mut cancel)
        .await;

    assert_eq!(decision.status, AuthStatus::Timeout);
    assert!(!decision.approved);
    assert!(decision.artifact.is_none());

    relay.shutdown();
}

#[tokio::test]
async fn stop_signal_abandons_the_wait_promptly() {
    let relay = TestRelay::start(None).await;
    let notifier = Arc::new(CapturingNotifier::default());
    let bridge = bridge_for(&relay, Arc::clone(&notifier));

    let (stop_tx, mut cancel) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = stop_tx.send(true);
    });

    let started = std::time::Instant::now();
    // A long budget: only the stop signal can end this wait early.
    let decision = bridge
        .request_and_wait(&ctx(Capability::Biometric, "Touch the sensor", 600), &mut cancel)
        .await;

    assert!(
        started.elapsed() < Duration::from_secs(5),
        "stop must cut the wait short, got {:?}",
        started.elapsed()
    );
    assert_eq!(decision.status, AuthStatus::Timeout);
    assert!(!decision.approved);

    relay.shutdown();
}
