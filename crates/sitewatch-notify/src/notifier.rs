use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use sitewatch_core::{CheckResult, SiteSpec, epoch_millis};

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("receiver rejected notification with status {0}")]
    Rejected(u16),
}

/// The body every notifier delivers.
#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    /// `notify-<kind>`.
    pub channel: &'a str,
    pub fixed: bool,
    pub site: &'a SiteSpec,
    pub result: &'a CheckResult,
    /// Milliseconds since the Unix epoch.
    pub sent_at: u64,
}

impl<'a> Notification<'a> {
    pub fn new(channel: &'a str, result: &'a CheckResult, site: &'a SiteSpec) -> Self {
        Self {
            channel,
            fixed: result.fixed,
            site,
            result,
            sent_at: epoch_millis(),
        }
    }
}

/// Delivers one alert for a site and result on a kind channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, result: &CheckResult, site: &SiteSpec) -> NotifyResult<()>;

    fn name(&self) -> &str;
}
