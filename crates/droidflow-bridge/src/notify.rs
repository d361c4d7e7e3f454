//! Notification channel for surfacing open URLs to the operator.
//!
//! The bridge only needs "send this message, maybe with a URL"; everything
//! else (formatting, sanitization, richer channels) stays outside this
//! crate. [`TelegramNotifier`] is the default implementation; the bot token
//! comes from `TELEGRAM_BOT_TOKEN`.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Errors from the notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Http(String),

    #[error("notification API error: {0}")]
    Api(String),

    #[error("missing bot token: set TELEGRAM_BOT_TOKEN")]
    MissingToken,
}

/// Where the bridge sends approval links.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message, with an optional URL appended.
    async fn send(&self, message: &str, url: Option<&str>) -> Result<(), NotifyError>;
}

/// Notifier that drops everything (headless runs, tests).
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _message: &str, _url: Option<&str>) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Telegram `sendMessage` notifier.
pub struct TelegramNotifier {
    http: reqwest::Client,
    base_url: String,
    chat_id: i64,
}

impl TelegramNotifier {
    /// Create a notifier for the given chat, reading the bot token from
    /// the environment.
    pub fn new(chat_id: i64) -> Result<Self, NotifyError> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or(NotifyError::MissingToken)?;
        Ok(Self::with_base_url(chat_id, &token, "https://api.telegram.org"))
    }

    /// Create a notifier with a custom API base URL (testing).
    pub fn with_base_url(chat_id: i64, bot_token: &str, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/bot{bot_token}", base_url.trim_end_matches('/')),
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str, url: Option<&str>) -> Result<(), NotifyError> {
        let text = match url {
            Some(url) => format!("{message}\n{url}"),
            None => message.to_string(),
        };

        let resp = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "telegram sendMessage failed");
            return Err(NotifyError::Api(format!("{status}: {body}")));
        }
        Ok(())
    }
}
