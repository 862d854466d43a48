//! Serial job queue — at most one check lifecycle runs at a time.
//!
//! Producers hold a cloneable [`SchedulerHandle`]; a single worker owns the
//! receiving end and the [`CheckLifecycle`]. Jobs run in enqueue order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use sitewatch_core::SiteSpec;

use crate::error::{SchedulerError, SchedulerResult};
use crate::lifecycle::{CheckLifecycle, JobOutcome};

/// Result reported back to whoever enqueued a job.
pub type JobResult = Result<JobOutcome, String>;

struct Job {
    site: SiteSpec,
    done: oneshot::Sender<JobResult>,
}

/// Completion handle for one enqueued job.
pub struct JobHandle {
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// Wait for the job to finish. `None` if the worker stopped first.
    pub async fn outcome(self) -> Option<JobResult> {
        self.rx.await.ok()
    }
}

/// Cloneable enqueue side of the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
}

impl SchedulerHandle {
    pub fn enqueue(&self, site: SiteSpec) -> SchedulerResult<JobHandle> {
        let (done, rx) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Job { site, done }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::Stopped);
        }
        debug!(pending = self.pending(), "job enqueued");
        Ok(JobHandle { rx })
    }

    /// Jobs enqueued but not yet finished, including the running one.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

pub struct SerialScheduler {
    rx: mpsc::UnboundedReceiver<Job>,
    lifecycle: CheckLifecycle,
    pending: Arc<AtomicUsize>,
}

impl SerialScheduler {
    pub fn new(lifecycle: CheckLifecycle) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let scheduler = Self {
            rx,
            lifecycle,
            pending: pending.clone(),
        };
        (scheduler, SchedulerHandle { tx, pending })
    }

    /// Run jobs one at a time until shutdown, until every handle is
    /// dropped, or until a job fails fatally.
    ///
    /// A fatal error is returned after the failing job's handle has been
    /// told about it. A cancelled job ends the loop without an error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        info!("serial scheduler started");

        loop {
            if *shutdown.borrow() {
                info!("serial scheduler shutting down");
                return Ok(());
            }

            let job = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("serial scheduler shutting down");
                    return Ok(());
                }
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => {
                        info!("all producers gone, serial scheduler stopping");
                        return Ok(());
                    }
                },
            };

            let url = job.site.url.clone();
            debug!(%url, "job started");
            let result = self.lifecycle.run(job.site, &shutdown).await;
            let remaining = self.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);

            match result {
                Ok(outcome) => {
                    debug!(%url, attempts = outcome.attempts, remaining, "job finished");
                    let _ = job.done.send(Ok(outcome));
                }
                Err(e) if !e.is_fatal() => {
                    info!(%url, "job cancelled");
                    let _ = job.done.send(Err(e.to_string()));
                    return Ok(());
                }
                Err(e) => {
                    error!(%url, error = %e, "job failed, stopping scheduler");
                    let _ = job.done.send(Err(e.to_string()));
                    return Err(e);
                }
            }

            if remaining == 0 {
                info!("queue drained");
            }
        }
    }
}
