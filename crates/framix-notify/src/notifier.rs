//! Notifier implementations.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{NotifyError, NotifyResult};

/// Delivers outcome messages to a user address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()>;
}

/// Message payload accepted by the mail relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// [`Notifier`] posting JSON to an HTTP mail relay.
pub struct HttpNotifier {
    api_url: String,
    api_key: Option<String>,
    from: String,
    client: Client,
}

impl HttpNotifier {
    pub fn new(api_url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: None,
            from: from.into(),
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Create from environment variables. `MAIL_API_URL` is required;
    /// `MAIL_API_KEY` and `MAIL_FROM` are optional.
    pub fn from_env() -> NotifyResult<Self> {
        let api_url = std::env::var("MAIL_API_URL")
            .map_err(|_| NotifyError::config_error("MAIL_API_URL not set"))?;
        let from =
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@framix.local".to_string());

        let mut notifier = Self::new(api_url, from);
        if let Ok(api_key) = std::env::var("MAIL_API_KEY") {
            notifier = notifier.with_api_key(api_key);
        }
        Ok(notifier)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()> {
        let message = RelayMessage {
            from: &self.from,
            to,
            subject,
            text: body,
        };

        let mut request = self.client.post(&self.api_url).json(&message);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::send_failed(format!("mail relay request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::RelayRejected { status, body });
        }

        debug!(to, subject, "Notification delivered");
        Ok(())
    }
}

/// [`Notifier`] that only logs, for deployments without a relay configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> NotifyResult<()> {
        info!(to, subject, "Notification (log only)");
        Ok(())
    }
}

/// A message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// [`Notifier`] that records messages instead of sending them.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> NotifyResult<()> {
        self.sent.lock().await.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
