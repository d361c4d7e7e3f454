//! Integration tests for the relay's HTTP protocol surface.
//!
//! Exercises the full request lifecycle over real HTTP: token scoping,
//! hash-only persistence, idempotent polling, lazy timeout, and
//! first-decision-wins resolution.

mod common;

use std::time::Duration;

use serde_json::json;

use common::{parse_open_url, TestRelay};
use droidflow::types::{
    AuthStatus, Capability, CreateAuthRequest, CreateAuthResponse, SessionId, StatusResponse,
};

fn create_body(capability: Capability, timeout_secs: u64) -> CreateAuthRequest {
    CreateAuthRequest {
        capability,
        instruction: "Please confirm the prompt".into(),
        session_id: SessionId::new(),
        step: 1,
        current_app: Some("com.example.app".into()),
        timeout_secs,
    }
}

async fn create(
    client: &reqwest::Client,
    relay: &TestRelay,
    body: &CreateAuthRequest,
) -> CreateAuthResponse {
    client
        .post(format!("{}/v1/requests", relay.base_url))
        .json(body)
        .send()
        .await
        .expect("create should reach the relay")
        .json()
        .await
        .expect("create should return the issued request")
}

async fn poll(
    client: &reqwest::Client,
    relay: &TestRelay,
    created: &CreateAuthResponse,
) -> StatusResponse {
    client
        .get(format!(
            "{}/v1/requests/{}/status",
            relay.base_url, created.request_id
        ))
        .query(&[("token", created.poll_token.as_str())])
        .send()
        .await
        .expect("poll should reach the relay")
        .json()
        .await
        .expect("poll should return a status")
}

#[tokio::test]
async fn tokens_are_distinct_and_never_persisted_in_plaintext() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let created = create(&client, &relay, &create_body(Capability::Camera, 60)).await;
    let (_, open_token) = parse_open_url(&created.open_url);

    assert_ne!(open_token, created.poll_token);

    let state = std::fs::read_to_string(&relay.state_path).unwrap();
    assert!(!state.contains(&open_token), "open token leaked to disk");
    assert!(
        !state.contains(&created.poll_token),
        "poll token leaked to disk"
    );

    relay.shutdown();
}

#[tokio::test]
async fn tokens_are_single_purpose() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let created = create(&client, &relay, &create_body(Capability::Qr, 60)).await;
    let (id, open_token) = parse_open_url(&created.open_url);

    // Poll token on the open-scoped page route: refused.
    let page = client
        .get(format!("{}/approve/{id}", relay.base_url))
        .query(&[("token", created.poll_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), reqwest::StatusCode::FORBIDDEN);

    // Open token on the poll-scoped status route: refused.
    let status = client
        .get(format!("{}/v1/requests/{id}/status", relay.base_url))
        .query(&[("token", open_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(status.status(), reqwest::StatusCode::FORBIDDEN);

    relay.shutdown();
}

#[tokio::test]
async fn approval_page_renders_instruction() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let created = create(&client, &relay, &create_body(Capability::TwoFactor, 60)).await;

    let page = client
        .get(&created.open_url)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Please confirm the prompt"));
    assert!(page.contains("2fa"));

    relay.shutdown();
}

#[tokio::test]
async fn resolve_then_poll_reports_terminal_status_idempotently() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let created = create(&client, &relay, &create_body(Capability::Camera, 60)).await;
    let (id, open_token) = parse_open_url(&created.open_url);

    let resolved = client
        .post(format!("{}/v1/requests/{id}/resolve", relay.base_url))
        .query(&[("token", open_token.as_str())])
        .json(&json!({ "decision": "approve", "message": "go ahead" }))
        .send()
        .await
        .unwrap();
    assert!(resolved.status().is_success());

    let first = poll(&client, &relay, &created).await;
    assert_eq!(first.status, AuthStatus::Approved);
    let decided_at = first.decided_at.expect("terminal status carries decided_at");

    // Repeated polls: same status, same decided_at, no re-trigger.
    for _ in 0..3 {
        let again = poll(&client, &relay, &created).await;
        assert_eq!(again.status, AuthStatus::Approved);
        assert_eq!(again.decided_at, Some(decided_at));
        assert_eq!(again.message.as_deref(), Some("go ahead"));
    }

    relay.shutdown();
}

#[tokio::test]
async fn second_resolve_fails_and_first_decision_sticks() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let created = create(&client, &relay, &create_body(Capability::Payment, 60)).await;
    let (id, open_token) = parse_open_url(&created.open_url);

    let first = client
        .post(format!("{}/v1/requests/{id}/resolve", relay.base_url))
        .query(&[("token", open_token.as_str())])
        .json(&json!({ "decision": "reject" }))
        .send()
        .await
        .unwrap();
    assert!(first.status().is_success());

    let second = client
        .post(format!("{}/v1/requests/{id}/resolve", relay.base_url))
        .query(&[("token", open_token.as_str())])
        .json(&json!({ "decision": "approve" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::FORBIDDEN);

    let polled = poll(&client, &relay, &created).await;
    assert_eq!(polled.status, AuthStatus::Rejected);

    relay.shutdown();
}

#[tokio::test]
async fn overdue_request_reports_timeout_on_next_poll() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let created = create(&client, &relay, &create_body(Capability::Sms, 1)).await;

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let polled = poll(&client, &relay, &created).await;
    assert_eq!(polled.status, AuthStatus::Timeout);

    // A decision after expiry is refused.
    let (id, open_token) = parse_open_url(&created.open_url);
    let late = client
        .post(format!("{}/v1/requests/{id}/resolve", relay.base_url))
        .query(&[("token", open_token.as_str())])
        .json(&json!({ "decision": "approve" }))
        .send()
        .await
        .unwrap();
    assert_eq!(late.status(), reqwest::StatusCode::FORBIDDEN);

    relay.shutdown();
}

#[tokio::test]
async fn bearer_gate_protects_machine_routes() {
    let relay = TestRelay::start(Some("secret-key")).await;
    let client = reqwest::Client::new();

    // Create without the key: refused.
    let bare = client
        .post(format!("{}/v1/requests", relay.base_url))
        .json(&create_body(Capability::Camera, 60))
        .send()
        .await
        .unwrap();
    assert_eq!(bare.status(), reqwest::StatusCode::UNAUTHORIZED);

    // Create with the key: accepted.
    let created: CreateAuthResponse = client
        .post(format!("{}/v1/requests", relay.base_url))
        .bearer_auth("secret-key")
        .json(&create_body(Capability::Camera, 60))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Status without the key: refused even with a valid poll token.
    let status = client
        .get(format!(
            "{}/v1/requests/{}/status",
            relay.base_url, created.request_id
        ))
        .query(&[("token", created.poll_token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(status.status(), reqwest::StatusCode::UNAUTHORIZED);

    // The human-facing approval page works with just the open token, so the
    // operator can follow the link from any browser.
    let page = client.get(&created.open_url).send().await.unwrap();
    assert!(page.status().is_success());

    relay.shutdown();
}

#[tokio::test]
async fn unknown_request_id_is_refused() {
    let relay = TestRelay::start(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{}/v1/requests/{}/status",
            relay.base_url,
            uuid::Uuid::new_v4()
        ))
        .query(&[("token", "whatever")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);

    relay.shutdown();
}
