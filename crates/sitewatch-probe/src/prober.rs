//! The prober seam.

use async_trait::async_trait;
use thiserror::Error;

use sitewatch_core::{CheckResult, ErrorKind, SiteAuth, SiteSpec};

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Failures of the probing machinery itself. Problems with the probed site
/// are never reported here; they come back as errors inside `CheckResult`.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build probe client: {0}")]
    Client(String),

    #[error("remote probe endpoint unavailable: {0}")]
    Endpoint(String),
}

/// Everything a prober needs to check one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub url: String,
    /// Kinds the caller wants reported; others are discarded.
    pub watch: Vec<ErrorKind>,
    pub ignore_ssl: bool,
    pub ignore: Vec<String>,
    pub auth: Option<SiteAuth>,
    /// Remote browser endpoint, for probers that drive one.
    pub remote_endpoint: Option<String>,
}

impl ProbeRequest {
    /// Request watching every kind.
    pub fn for_site(site: &SiteSpec, remote_endpoint: Option<&str>) -> Self {
        Self {
            url: site.url.clone(),
            watch: ErrorKind::ALL.to_vec(),
            ignore_ssl: site.ignore_ssl,
            ignore: site.ignore.clone(),
            auth: site.auth.clone(),
            remote_endpoint: remote_endpoint.map(str::to_string),
        }
    }

    /// Drop errors of unwatched kinds and errors matching the ignore list.
    pub fn filter(&self, mut result: CheckResult) -> CheckResult {
        result.errors.retain(|e| {
            self.watch.contains(&e.kind)
                && !self
                    .ignore
                    .iter()
                    .any(|pattern| !pattern.is_empty() && e.message.contains(pattern.as_str()))
        });
        result
    }
}

/// Runs a single check of a site.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult<CheckResult>;
}
