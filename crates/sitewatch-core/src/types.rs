//! Shared types used across sitewatch crates.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Log entry type written by the scheduler itself (retry markers).
pub const SYSTEM_LOG_TYPE: &str = "SYSTEM";

/// The closed set of error kinds a probe can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The page could not be loaded at all.
    Down,
    /// The page raised an uncaught script error.
    Process,
    /// A sub-resource of the page failed to load.
    Resource,
}

impl ErrorKind {
    /// Every kind, in a stable order. Drives recovery scans and key cleanup.
    pub const ALL: [ErrorKind; 3] = [ErrorKind::Down, ErrorKind::Process, ErrorKind::Resource];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Down => "down",
            ErrorKind::Process => "process",
            ErrorKind::Resource => "resource",
        }
    }

    /// Notifier channel name for this kind, e.g. `notify-down`.
    pub fn channel(&self) -> String {
        format!("notify-{}", self.as_str())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" => Ok(ErrorKind::Down),
            "process" => Ok(ErrorKind::Process),
            "resource" => Ok(ErrorKind::Resource),
            other => Err(UnknownErrorKind(other.to_string())),
        }
    }
}

/// One diagnostic line gathered while checking a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub message: String,
}

impl LogEntry {
    /// A `SYSTEM` entry stamped with the current time.
    pub fn system(message: impl Into<String>) -> Self {
        Self {
            kind: SYSTEM_LOG_TYPE.to_string(),
            timestamp: epoch_millis(),
            message: message.into(),
        }
    }
}

/// Basic-auth credentials handed through to the prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

// ── Site ───────────────────────────────────────────────────────────

/// A monitored target.
///
/// Built from configuration or from a change-event payload. One value is
/// owned by a single check lifecycle; `checks` and `logs` accumulate across
/// retries of that lifecycle and are dropped with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub url: String,
    #[serde(default, alias = "mail")]
    pub email: Option<String>,
    #[serde(default, alias = "ignoreSsl")]
    pub ignore_ssl: bool,
    /// Patterns the prober should not report.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Per-site override of the retry bound.
    #[serde(default, alias = "maxRuns", skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<SiteAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
    /// Attempts so far in the current incident. Anything that is not a
    /// non-negative integer is read as unset.
    #[serde(
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub checks: Option<u32>,
}

impl SiteSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            email: None,
            ignore_ssl: false,
            ignore: Vec::new(),
            max_runs: None,
            auth: None,
            logs: Vec::new(),
            checks: None,
        }
    }

    pub fn with_max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u32::MAX as f64)
                .map(|f| f as u32)
        }))
}

// ── Check results ──────────────────────────────────────────────────

/// A typed error observed during one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SiteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one prober invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Errors in the order the prober observed them.
    pub errors: Vec<SiteError>,
    /// Path of a screenshot artifact, if the prober took one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Attempts it took to reach this result. Set when the lifecycle finalizes.
    #[serde(default)]
    pub retries: u32,
    /// Set on notifications announcing that a kind went away.
    #[serde(default)]
    pub fixed: bool,
}

impl CheckResult {
    /// A result with no errors.
    pub fn healthy() -> Self {
        Self::default()
    }

    /// A result carrying one error per given kind.
    pub fn failing(kinds: &[ErrorKind]) -> Self {
        Self {
            errors: kinds
                .iter()
                .map(|kind| SiteError::new(*kind, format!("{kind} error")))
                .collect(),
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Distinct kinds observed, in first-seen order.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        let mut kinds = Vec::new();
        for error in &self.errors {
            if !kinds.contains(&error.kind) {
                kinds.push(error.kind);
            }
        }
        kinds
    }
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
