//! HTTP decision client for Anthropic and OpenAI providers.
//!
//! API keys are read exclusively from environment variables
//! (`ANTHROPIC_API_KEY` / `OPENAI_API_KEY`), never from configuration or
//! request payloads. The HTTP client follows no redirects and enforces
//! connect/request timeouts.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{debug, warn};

use droidflow_device::Observation;
use droidflow_types::config::{ModelConfig, ModelProvider};
use droidflow_types::AgentAction;

use crate::error::ModelError;
use crate::parse;
use crate::prompt;
use crate::DecisionProvider;

const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Multimodal decision client implementing [`DecisionProvider`].
pub struct DecisionClient {
    http: reqwest::Client,
    config: ModelConfig,
    api_key: String,
}

impl DecisionClient {
    /// Create a client for the configured provider.
    ///
    /// Fails fast when the provider's API key environment variable is unset
    /// so a task does not make it halfway before hitting a 401.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let var = match config.provider {
            ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
            ModelProvider::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(ModelError::MissingApiKey { var })?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .user_agent("droidflow/0.1")
            .build()
            .map_err(|e| ModelError::Http(e.to_string()))?;

        Ok(Self { http, config, api_key })
    }

    fn base_url(&self) -> &str {
        match self.config.api_base.as_deref() {
            Some(base) => base.trim_end_matches('/'),
            None => match self.config.provider {
                ModelProvider::Anthropic => ANTHROPIC_DEFAULT_BASE,
                ModelProvider::OpenAi => OPENAI_DEFAULT_BASE,
            },
        }
    }

    async fn complete_anthropic(
        &self,
        user_text: &str,
        screenshot_b64: &str,
    ) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": prompt::SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/png",
                            "data": screenshot_b64,
                        },
                    },
                    { "type": "text", "text": user_text },
                ],
            }],
        });

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url()))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let value: Value = resp.json().await?;
        if !status.is_success() {
            let message = value["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(ModelError::Api { status: status.as_u16(), message });
        }

        // The first text block carries the completion.
        value["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .map(str::to_string)
            .ok_or_else(|| ModelError::ResponseShape("no text block in content".into()))
    }

    async fn complete_openai(
        &self,
        user_text: &str,
        screenshot_b64: &str,
    ) -> Result<String, ModelError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": prompt::SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:image/png;base64,{screenshot_b64}") },
                        },
                        { "type": "text", "text": user_text },
                    ],
                },
            ],
        });

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url()))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let value: Value = resp.json().await?;
        if !status.is_success() {
            let message = value["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(ModelError::Api { status: status.as_u16(), message });
        }

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::ResponseShape("no message content in choices".into()))
    }
}

#[async_trait]
impl DecisionProvider for DecisionClient {
    async fn decide(
        &self,
        goal: &str,
        observation: &Observation,
        history: &[String],
    ) -> Result<AgentAction, ModelError> {
        let user_text =
            prompt::build_user_text(goal, observation.foreground_app.as_deref(), history);
        let screenshot_b64 = B64.encode(&observation.screenshot_png);

        let text = match self.config.provider {
            ModelProvider::Anthropic => {
                self.complete_anthropic(&user_text, &screenshot_b64).await?
            }
            ModelProvider::OpenAi => self.complete_openai(&user_text, &screenshot_b64).await?,
        };

        debug!(chars = text.len(), "model completion received");

        // Malformed output is normalized, never fatal: the task keeps
        // stepping and the model gets a fresh look next turn.
        match parse::parse_action(&text) {
            Ok(action) => Ok(action),
            Err(e) => {
                warn!(error = %e, "malformed model output, normalizing to wait");
                Ok(parse::fallback_action())
            }
        }
    }
}
