//! Chat delivery of recommendation messages

use anyhow::Context;
use async_trait::async_trait;
use exporter_lib::{ChatNotifier, FinopsError, FinopsResult};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts messages to a Mattermost incoming webhook
pub struct MattermostNotifier {
    client: Client,
    webhook_url: String,
}

impl MattermostNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl ChatNotifier for MattermostNotifier {
    async fn notify(&self, message: &str) -> FinopsResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&WebhookPayload { text: message })
            .send()
            .await
            .map_err(|e| FinopsError::Publish(format!("webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FinopsError::Publish(format!("webhook error ({}): {}", status, body)));
        }

        debug!(bytes = message.len(), "Recommendation posted");
        Ok(())
    }
}

/// Writes messages to the log when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl ChatNotifier for LogNotifier {
    async fn notify(&self, message: &str) -> FinopsResult<()> {
        info!(event = "recommendation_message", message = %message, "No webhook configured");
        Ok(())
    }
}
