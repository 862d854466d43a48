//! Fire-and-forget liveness ping sent at the start of each probe attempt.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone)]
pub struct HealthPing {
    url: String,
    client: reqwest::Client,
}

impl HealthPing {
    pub fn new(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one GET in the background. The handle resolves to whether the
    /// endpoint answered 2xx; callers are free to drop it.
    pub fn ping(&self, site_url: &str) -> JoinHandle<bool> {
        let client = self.client.clone();
        let target = self.url.clone();
        let site_url = site_url.to_string();
        tokio::spawn(async move {
            match client.get(&target).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %site_url, "health check ping sent");
                    true
                }
                Ok(resp) => {
                    debug!(url = %site_url, status = resp.status().as_u16(), "health check ping rejected");
                    false
                }
                Err(e) => {
                    debug!(url = %site_url, error = %e, "health check ping failed");
                    false
                }
            }
        })
    }
}
