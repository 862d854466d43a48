//! Retry ladder: whether a failing check is retried in place or
//! finalized into notification handling.
//!
//! The counter lives on the `SiteSpec` owned by the lifecycle, so it only
//! spans one job: a fresh job starts from whatever the payload carried.

use tracing::info;

use sitewatch_core::{LogEntry, SiteSpec};
use sitewatch_core::config::DEFAULT_MAX_RUNS;

/// What to do after an attempt that reported errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Probe again immediately; `attempt` is the number of the next run.
    Retry { attempt: u32 },
    /// Stop retrying; `retries` is the final attempt count.
    Finalize { retries: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct RetryLadder {
    default_max_runs: u32,
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RUNS)
    }
}

impl RetryLadder {
    pub fn new(default_max_runs: u32) -> Self {
        Self { default_max_runs }
    }

    /// The bound for a site: its override, else the default, never below 1.
    pub fn max_runs(&self, site: &SiteSpec) -> u32 {
        site.max_runs.unwrap_or(self.default_max_runs).max(1)
    }

    /// Record a failed attempt on `site` and decide what happens next.
    ///
    /// An unset counter becomes 1, otherwise it is incremented. Below the
    /// bound, a `SYSTEM` log entry for the next run is appended.
    pub fn record_failure(&self, site: &mut SiteSpec) -> RetryDecision {
        let checks = site.checks.map_or(1, |n| n.saturating_add(1));
        site.checks = Some(checks);

        let max_runs = self.max_runs(site);
        if checks < max_runs {
            let attempt = checks + 1;
            let message = format!("Starting run number {attempt} of {}", site.url);
            info!(url = %site.url, attempt, max_runs, "retrying failed check");
            site.logs.push(LogEntry::system(message));
            RetryDecision::Retry { attempt }
        } else {
            RetryDecision::Finalize { retries: checks }
        }
    }
}
