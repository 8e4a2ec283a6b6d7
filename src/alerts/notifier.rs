//! Outbound delivery channels for rendered alerts

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use crate::config::AlertConfig;

use super::AlertMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A channel that can carry one alert to its destination
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &AlertMessage) -> Result<()>;

    /// Channel name used in log lines
    fn name(&self) -> &'static str;
}

/// Pick the delivery channel the configuration has credentials for.
pub fn from_config(config: &AlertConfig) -> Result<Box<dyn Notifier>> {
    if let Some(api_key) = &config.api_key {
        return Ok(Box::new(EmailApiNotifier::new(
            &config.api_url,
            api_key,
            &config.from,
        )?));
    }

    if let Some(url) = &config.webhook_url {
        return Ok(Box::new(WebhookNotifier::new(url)?));
    }

    Ok(Box::new(LogNotifier))
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Sends through a Resend-compatible email API (`POST {base}/emails`)
pub struct EmailApiNotifier {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl EmailApiNotifier {
    pub fn new(base_url: &str, api_key: &str, from: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for EmailApiNotifier {
    #[instrument(skip(self, message), fields(notifier = "email", to = %message.to))]
    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        let payload = json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to reach email API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("email API rejected alert with {status}: {body}");
        }

        info!("alert email accepted by API");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

/// Posts a JSON summary of the alert to an arbitrary URL
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, message), fields(notifier = "webhook"))]
    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        let payload = json!({
            "message": message.text,
            "subject": message.subject,
            "to": message.to,
            "tankerId": message.unit_id,
            "timestamp": message.timestamp.to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("failed to send webhook alert")?;

        if !response.status().is_success() {
            anyhow::bail!("webhook alert failed with status: {}", response.status());
        }

        info!("successfully sent webhook alert");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Fallback when no channel is configured: the alert only goes to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "no delivery channel configured, alert logged only:\n{}",
            message.text
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
