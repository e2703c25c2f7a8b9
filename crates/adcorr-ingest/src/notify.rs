//! Failure notification
//!
//! The driver raises an alert for every failed stage. Delivery is best
//! effort: callers log a failed delivery and carry on.

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::NotifyError;

/// Alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct Alert<'a> {
    subject: &'a str,
    body: &'a str,
    sent_at: String,
}

/// POSTs alerts as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let alert = Alert {
            subject,
            body,
            sent_at: chrono::Utc::now().to_rfc3339(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&alert)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }

        debug!(endpoint = %self.endpoint, subject, "Alert delivered");
        Ok(())
    }
}

/// Logs alerts instead of sending them; used when no endpoint is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        warn!(subject, body, "Alert raised (no notifier endpoint configured)");
        Ok(())
    }
}
