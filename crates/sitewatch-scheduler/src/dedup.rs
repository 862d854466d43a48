//! Notification dedup gate.
//!
//! One key per `(url, kind)` pair records that a kind is currently being
//! reported. A kind seen with no key raises a notification and sets the
//! key; a kind seen with a key is suppressed; a key whose kind is no longer
//! seen produces a `fixed` notification and, once delivered, is removed.
//!
//! The new-incident pass finishes before the recovery pass starts. Within
//! each pass the per-kind operations run concurrently.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use sitewatch_core::{CheckResult, ErrorKind, SiteSpec, epoch_millis};
use sitewatch_notify::Notifier;
use sitewatch_state::{Store, dedup_key};

use crate::error::{SchedulerError, SchedulerResult};

/// What the gate did for one finalized result, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// New incidents delivered.
    pub notified: Vec<ErrorKind>,
    /// New incidents whose delivery failed. Their keys are still set.
    pub undelivered: Vec<ErrorKind>,
    /// Kinds already active; no notification sent.
    pub suppressed: Vec<ErrorKind>,
    /// Recoveries delivered; keys removed.
    pub fixed: Vec<ErrorKind>,
    /// Recoveries whose delivery failed; keys kept for the next run.
    pub retained: Vec<ErrorKind>,
}

impl DedupReport {
    /// Number of notifications attempted.
    pub fn sent(&self) -> usize {
        self.notified.len() + self.undelivered.len() + self.fixed.len() + self.retained.len()
    }
}

enum Raised {
    Notified(ErrorKind),
    Undelivered(ErrorKind),
    Suppressed(ErrorKind),
}

enum Recovered {
    Inactive,
    Fixed(ErrorKind),
    Retained(ErrorKind),
}

pub struct DedupGate {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    /// Outer bound on one notifier call. Set above the notifier's own
    /// timeout so a slow receiver fails the delivery, not the job.
    notify_deadline: Duration,
}

impl DedupGate {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, notify_deadline: Duration) -> Self {
        Self {
            store,
            notifier,
            notify_deadline,
        }
    }

    /// Raise, suppress, or resolve notifications for a finalized result.
    pub async fn apply(&self, site: &SiteSpec, result: &CheckResult) -> SchedulerResult<DedupReport> {
        let observed = result.kinds();
        let mut report = DedupReport::default();

        let raised = try_join_all(observed.iter().map(|kind| self.raise(site, result, *kind))).await?;
        for outcome in raised {
            match outcome {
                Raised::Notified(kind) => report.notified.push(kind),
                Raised::Undelivered(kind) => report.undelivered.push(kind),
                Raised::Suppressed(kind) => report.suppressed.push(kind),
            }
        }
        if !observed.is_empty() {
            debug!(url = %site.url, "new-incident pass complete");
        }

        let recovered = try_join_all(
            ErrorKind::ALL
                .iter()
                .filter(|kind| !observed.contains(kind))
                .map(|kind| self.recover(site, result, *kind)),
        )
        .await?;
        for outcome in recovered {
            match outcome {
                Recovered::Inactive => {}
                Recovered::Fixed(kind) => report.fixed.push(kind),
                Recovered::Retained(kind) => report.retained.push(kind),
            }
        }

        Ok(report)
    }

    async fn raise(&self, site: &SiteSpec, result: &CheckResult, kind: ErrorKind) -> SchedulerResult<Raised> {
        let key = dedup_key(&site.url, kind.as_str());

        if let Some(since) = self.store.get(&key).await? {
            info!(
                url = %site.url,
                %kind,
                active_for = %describe_elapsed(&since),
                "skipping notification, already reported"
            );
            return Ok(Raised::Suppressed(kind));
        }

        // The notification goes out even when the key cannot be recorded;
        // the store failure is surfaced afterwards.
        let recorded = self.store.set(&key, &epoch_millis().to_string()).await;
        if let Err(e) = &recorded {
            error!(url = %site.url, %kind, error = %e, "failed to record dedup key");
        }

        info!(
            url = %site.url,
            email = site.email.as_deref().unwrap_or("-"),
            %kind,
            "notifying about new error"
        );
        let delivered = self.deliver(&kind.channel(), result, site).await?;
        recorded?;

        Ok(if delivered {
            Raised::Notified(kind)
        } else {
            Raised::Undelivered(kind)
        })
    }

    async fn recover(&self, site: &SiteSpec, result: &CheckResult, kind: ErrorKind) -> SchedulerResult<Recovered> {
        let key = dedup_key(&site.url, kind.as_str());
        if self.store.get(&key).await?.is_none() {
            return Ok(Recovered::Inactive);
        }

        info!(url = %site.url, %kind, "change for the better detected");
        let mut fixed = result.clone();
        fixed.fixed = true;

        if self.deliver(&kind.channel(), &fixed, site).await? {
            self.store.delete(&key).await?;
            Ok(Recovered::Fixed(kind))
        } else {
            warn!(url = %site.url, %kind, "keeping dedup key until recovery is delivered");
            Ok(Recovered::Retained(kind))
        }
    }

    /// `Ok(false)` when the notifier failed; a timeout is an error.
    async fn deliver(&self, channel: &str, result: &CheckResult, site: &SiteSpec) -> SchedulerResult<bool> {
        let send = self.notifier.notify(channel, result, site);
        match tokio::time::timeout(self.notify_deadline, send).await {
            Ok(Ok(())) => {
                debug!(%channel, url = %site.url, notifier = self.notifier.name(), "notification delivered");
                Ok(true)
            }
            Ok(Err(e)) => {
                error!(%channel, url = %site.url, notifier = self.notifier.name(), error = %e, "notification failed");
                Ok(false)
            }
            Err(_) => Err(SchedulerError::Timeout {
                operation: "notify",
                url: site.url.clone(),
                timeout: self.notify_deadline,
            }),
        }
    }
}

/// Human-readable age of a stored millisecond timestamp.
fn describe_elapsed(since: &str) -> String {
    match since.parse::<u64>() {
        Ok(ms) => {
            let secs = epoch_millis().saturating_sub(ms) / 1000;
            format!("{}h{:02}m{:02}s", secs / 3600, (secs / 60) % 60, secs % 60)
        }
        Err(_) => "unknown".to_string(),
    }
}
