//! Fixed-interval producer and job log seeding.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use sitewatch_core::SiteSpec;
use sitewatch_state::Store;

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::SchedulerHandle;

pub struct ProducerCron {
    sites: Vec<SiteSpec>,
    interval: Duration,
    store: Arc<dyn Store>,
    scheduler: SchedulerHandle,
}

impl ProducerCron {
    pub fn new(sites: Vec<SiteSpec>, interval: Duration, store: Arc<dyn Store>, scheduler: SchedulerHandle) -> Self {
        Self {
            sites,
            interval,
            store,
            scheduler,
        }
    }

    /// Append and enqueue every site once. Returns the number enqueued.
    pub async fn tick(&self) -> SchedulerResult<usize> {
        let backlog = self.scheduler.pending();
        if backlog > 0 {
            warn!(backlog, "previous round still queued");
        }

        for site in &self.sites {
            let payload = encode(site)?;
            self.store.append(&payload).await?;
            self.scheduler.enqueue(site.clone())?;
            debug!(url = %site.url, "site enqueued");
        }
        Ok(self.sites.len())
    }

    /// Tick every interval until shutdown. The first tick fires one
    /// interval after start; later ticks keep that schedule, and an
    /// overrunning tick delays the next one. Store failures are returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        info!(
            sites = self.sites.len(),
            interval_ms = self.interval.as_millis() as u64,
            "producer cron started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.tick().await {
                    Ok(enqueued) => debug!(enqueued, "producer tick"),
                    Err(SchedulerError::Stopped) if *shutdown.borrow() => {
                        info!("scheduler stopped during shutdown, producer exiting");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.changed() => {
                    info!("producer cron shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Write every site to the job log, but only if the log is empty.
/// Returns the number of entries written.
pub async fn seed(store: &dyn Store, sites: &[SiteSpec]) -> SchedulerResult<usize> {
    let existing = store.job_log().await?;
    if !existing.is_empty() {
        info!(entries = existing.len(), "job log already populated, skipping seed");
        return Ok(0);
    }

    for site in sites {
        store.append(&encode(site)?).await?;
    }
    info!(entries = sites.len(), "job log seeded");
    Ok(sites.len())
}

fn encode(site: &SiteSpec) -> SchedulerResult<String> {
    serde_json::to_string(site).map_err(|e| SchedulerError::Encode(e.to_string()))
}
