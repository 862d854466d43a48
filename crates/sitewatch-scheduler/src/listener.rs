//! Turns JSON site payloads from the change channel into queued jobs.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use sitewatch_core::SiteSpec;
use sitewatch_state::Subscription;

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::{JobHandle, SchedulerHandle};

pub struct ChangeListener {
    scheduler: SchedulerHandle,
    dropped: AtomicU64,
}

impl ChangeListener {
    pub fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            scheduler,
            dropped: AtomicU64::new(0),
        }
    }

    /// Consume `subscription` until it closes or shutdown is signalled.
    pub async fn run(&self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        info!("change listener started");
        loop {
            tokio::select! {
                event = subscription.next() => match event {
                    Some(event) => match self.handle(&event.payload) {
                        Ok(_) => {}
                        Err(SchedulerError::Stopped) if *shutdown.borrow() => {
                            info!("scheduler stopped during shutdown, listener exiting");
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    },
                    None => {
                        info!("change subscription closed");
                        return Ok(());
                    }
                },
                _ = shutdown.changed() => {
                    info!("change listener shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Enqueue one payload. Malformed payloads are logged and dropped.
    pub fn handle(&self, payload: &str) -> SchedulerResult<Option<JobHandle>> {
        debug!(bytes = payload.len(), "got notification for change");
        let site: SiteSpec = match serde_json::from_str(payload) {
            Ok(site) => site,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping malformed change message");
                return Ok(None);
            }
        };

        info!(url = %site.url, "change received, adding site to the queue");
        Ok(Some(self.scheduler.enqueue(site)?))
    }

    /// Messages dropped as malformed so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
