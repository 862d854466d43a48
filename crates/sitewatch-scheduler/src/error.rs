//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can end a check lifecycle.
///
/// Everything except [`SchedulerError::Cancelled`] is fatal: the serial
/// worker stops and hands the error to whoever is supervising it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    State(#[from] sitewatch_state::StateError),

    #[error("prober error: {0}")]
    Probe(#[from] sitewatch_probe::ProbeError),

    #[error("{operation} for {url} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        url: String,
        timeout: Duration,
    },

    #[error("failed to encode site payload: {0}")]
    Encode(String),

    #[error("check cancelled for {0}")]
    Cancelled(String),

    #[error("scheduler is no longer accepting jobs")]
    Stopped,
}

impl SchedulerError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SchedulerError::Cancelled(_))
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
