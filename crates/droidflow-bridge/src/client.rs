//! HTTP client for the relay's machine-facing routes.

use std::time::Duration;

use tracing::debug;

use droidflow_types::{
    CreateAuthRequest, CreateAuthResponse, DroidflowError, RequestId, StatusResponse,
};

/// Thin typed wrapper around the relay's create and status endpoints.
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, DroidflowError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent("droidflow-bridge/0.1")
            .build()
            .map_err(|e| DroidflowError::DecisionPoll(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// `POST /v1/requests`.
    pub async fn create_request(
        &self,
        body: &CreateAuthRequest,
    ) -> Result<CreateAuthResponse, DroidflowError> {
        let resp = self
            .with_auth(self.http.post(format!("{}/v1/requests", self.base_url)))
            .json(body)
            .send()
            .await
            .map_err(|e| DroidflowError::DecisionPoll(format!("create request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(DroidflowError::DecisionPoll(format!(
                "create request returned {status}: {text}"
            )));
        }
        let created: CreateAuthResponse = resp
            .json()
            .await
            .map_err(|e| DroidflowError::DecisionPoll(format!("create response: {e}")))?;
        debug!(request_id = %created.request_id, "auth request created on relay");
        Ok(created)
    }

    /// `GET /v1/requests/{id}/status?token=<poll>`.
    pub async fn poll_status(
        &self,
        request_id: RequestId,
        poll_token: &str,
    ) -> Result<StatusResponse, DroidflowError> {
        let resp = self
            .with_auth(self.http.get(format!(
                "{}/v1/requests/{request_id}/status",
                self.base_url
            )))
            .query(&[("token", poll_token)])
            .send()
            .await
            .map_err(|e| DroidflowError::DecisionPoll(format!("status poll: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(DroidflowError::InvalidOrExpiredToken);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(DroidflowError::DecisionPoll(format!(
                "status poll returned {status}: {text}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| DroidflowError::DecisionPoll(format!("status response: {e}")))
    }
}
