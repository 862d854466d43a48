//! Check lifecycle — one job from first probe to notification handling.
//!
//! ```text
//! probe ─► no errors ─────────────────────────────► dedup (recovery only)
//!   │
//!   └──► errors ─► ladder ─► retry ─► probe again
//!                        └─► finalize ─► dedup (new + recovery)
//! ```
//!
//! Screenshots of results that never reach notification handling are
//! removed once the decision is made. A cancellation signal is checked
//! between steps, never in the middle of a store operation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use sitewatch_core::{CheckResult, SiteSpec, SitewatchConfig};
use sitewatch_core::config::DEFAULT_MAX_RUNS;
use sitewatch_notify::Notifier;
use sitewatch_probe::{ProbeRequest, Prober};
use sitewatch_state::Store;

use crate::dedup::{DedupGate, DedupReport};
use crate::error::{SchedulerError, SchedulerResult};
use crate::health::HealthPing;
use crate::retry::{RetryDecision, RetryLadder};

/// Extra time allowed on top of an adapter's own timeout before the call
/// is treated as stuck.
pub const STUCK_CALL_GRACE: Duration = Duration::from_secs(5);

/// Tunables for a lifecycle.
///
/// `probe_timeout` and `notify_timeout` are the timeouts the prober and
/// notifier enforce themselves; a slow site or receiver surfaces through
/// them as an ordinary error. The lifecycle only fails with
/// [`SchedulerError::Timeout`] once a call overruns its timeout by
/// [`STUCK_CALL_GRACE`].
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub default_max_runs: u32,
    pub probe_timeout: Duration,
    pub notify_timeout: Duration,
    pub remote_endpoint: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_max_runs: DEFAULT_MAX_RUNS,
            probe_timeout: Duration::from_secs(60),
            notify_timeout: Duration::from_secs(30),
            remote_endpoint: None,
        }
    }
}

impl LifecycleConfig {
    pub fn from_config(config: &SitewatchConfig) -> Self {
        Self {
            default_max_runs: config.default_max_runs,
            probe_timeout: config.probe_timeout(),
            notify_timeout: config.notify_timeout(),
            remote_endpoint: config.browser_ws_endpoint.clone(),
        }
    }
}

/// Summary of one finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub url: String,
    /// Probe invocations made for this job.
    pub attempts: u32,
    /// Errors in the result handed to the dedup gate.
    pub errors: usize,
    pub report: DedupReport,
}

pub struct CheckLifecycle {
    prober: Arc<dyn Prober>,
    ladder: RetryLadder,
    gate: DedupGate,
    health: Option<HealthPing>,
    probe_deadline: Duration,
    remote_endpoint: Option<String>,
}

impl CheckLifecycle {
    pub fn new(
        prober: Arc<dyn Prober>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            prober,
            ladder: RetryLadder::new(config.default_max_runs),
            gate: DedupGate::new(store, notifier, config.notify_timeout + STUCK_CALL_GRACE),
            health: None,
            probe_deadline: config.probe_timeout + STUCK_CALL_GRACE,
            remote_endpoint: config.remote_endpoint,
        }
    }

    pub fn with_health_ping(mut self, ping: HealthPing) -> Self {
        self.health = Some(ping);
        self
    }

    /// Drive one site through probing, retries, and notification handling.
    ///
    /// Returns [`SchedulerError::Cancelled`] if `shutdown` flips to `true`
    /// before the job finishes.
    pub async fn run(&self, mut site: SiteSpec, shutdown: &watch::Receiver<bool>) -> SchedulerResult<JobOutcome> {
        let mut attempts = 0;

        loop {
            ensure_running(&site, shutdown)?;
            attempts += 1;
            debug!(url = %site.url, attempt = attempts, "probing site");
            let result = self.probe_once(&site).await?;
            ensure_running(&site, shutdown)?;

            if !result.has_errors() {
                info!(url = %site.url, attempts, "no errors");
                let report = self.gate.apply(&site, &result).await?;
                discard_screenshot(&result).await;
                return Ok(JobOutcome {
                    url: site.url,
                    attempts,
                    errors: 0,
                    report,
                });
            }

            let kinds: Vec<&str> = result.kinds().iter().map(|k| k.as_str()).collect();
            warn!(url = %site.url, attempt = attempts, ?kinds, "site reported errors");
            site.logs.extend(result.logs.iter().cloned());

            match self.ladder.record_failure(&mut site) {
                RetryDecision::Retry { .. } => {
                    discard_screenshot(&result).await;
                }
                RetryDecision::Finalize { retries } => {
                    let mut result = result;
                    result.retries = retries;
                    result.logs = site.logs.clone();
                    ensure_running(&site, shutdown)?;

                    let report = self.gate.apply(&site, &result).await?;
                    info!(
                        url = %site.url,
                        retries,
                        notified = report.notified.len(),
                        suppressed = report.suppressed.len(),
                        "check finalized"
                    );
                    return Ok(JobOutcome {
                        url: site.url,
                        attempts,
                        errors: result.errors.len(),
                        report,
                    });
                }
            }
        }
    }

    async fn probe_once(&self, site: &SiteSpec) -> SchedulerResult<CheckResult> {
        if let Some(ping) = &self.health {
            // Detached; the outcome is only logged.
            let _ = ping.ping(&site.url);
        }

        let request = ProbeRequest::for_site(site, self.remote_endpoint.as_deref());
        match tokio::time::timeout(self.probe_deadline, self.prober.probe(&request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SchedulerError::Timeout {
                operation: "probe",
                url: site.url.clone(),
                timeout: self.probe_deadline,
            }),
        }
    }
}

fn ensure_running(site: &SiteSpec, shutdown: &watch::Receiver<bool>) -> SchedulerResult<()> {
    if *shutdown.borrow() {
        return Err(SchedulerError::Cancelled(site.url.clone()));
    }
    Ok(())
}

async fn discard_screenshot(result: &CheckResult) {
    if let Some(path) = result.screenshot.as_deref() {
        remove_artifact(path).await;
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed screenshot"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove screenshot"),
    }
}
