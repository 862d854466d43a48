use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use sitewatch_core::{CheckResult, SiteSpec};

use crate::notifier::{Notification, Notifier, NotifyError, NotifyResult};

// ── Log ────────────────────────────────────────────────────────────

/// Writes each notification as a structured log line.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, channel: &str, result: &CheckResult, site: &SiteSpec) -> NotifyResult<()> {
        if result.fixed {
            info!(
                %channel,
                url = %site.url,
                email = site.email.as_deref().unwrap_or("-"),
                "site recovered"
            );
        } else {
            warn!(
                %channel,
                url = %site.url,
                email = site.email.as_deref().unwrap_or("-"),
                errors = result.errors.len(),
                retries = result.retries,
                "site error"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ── Webhook ────────────────────────────────────────────────────────

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> NotifyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, channel: &str, result: &CheckResult, site: &SiteSpec) -> NotifyResult<()> {
        let body = Notification::new(channel, result, site);
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
