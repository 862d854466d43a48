//! Plain HTTP prober.
//!
//! Issues a single GET against the site URL. A transport failure, timeout,
//! or non-2xx status is reported as a `down` error; everything else is
//! healthy. It never reports `process` or `resource`, which need a browser.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use sitewatch_core::{CheckResult, ErrorKind, LogEntry, SiteError, epoch_millis};

use crate::prober::{ProbeError, ProbeRequest, ProbeResult, Prober};

const USER_AGENT: &str = concat!("sitewatch/", env!("CARGO_PKG_VERSION"));

pub struct HttpProber {
    strict: reqwest::Client,
    /// Accepts invalid certificates, for sites with `ignore_ssl`.
    lenient: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> ProbeResult<Self> {
        let build = |accept_invalid: bool| {
            reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| ProbeError::Client(e.to_string()))
        };
        Ok(Self {
            strict: build(false)?,
            lenient: build(true)?,
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult<CheckResult> {
        if let Some(endpoint) = &request.remote_endpoint {
            debug!(%endpoint, "http prober ignores remote endpoint");
        }

        let mut result = CheckResult::healthy();
        let url = match reqwest::Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => {
                result
                    .errors
                    .push(SiteError::new(ErrorKind::Down, format!("invalid url {}: {e}", request.url)));
                return Ok(request.filter(result));
            }
        };

        let client = if request.ignore_ssl {
            &self.lenient
        } else {
            &self.strict
        };
        let mut req = client.get(url);
        if let Some(auth) = &request.auth {
            req = req.basic_auth(&auth.username, auth.password.as_ref());
        }

        let started = Instant::now();
        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                let elapsed_ms = started.elapsed().as_millis();
                result.logs.push(LogEntry {
                    kind: "info".to_string(),
                    timestamp: epoch_millis(),
                    message: format!("GET {} -> {} in {elapsed_ms}ms", request.url, status),
                });
                if !status.is_success() {
                    debug!(%status, url = %request.url, "probe non-2xx");
                    result.errors.push(SiteError::new(
                        ErrorKind::Down,
                        format!("{} responded with {}", request.url, status),
                    ));
                }
            }
            Err(e) => {
                debug!(error = %e, url = %request.url, "probe request failed");
                let message = if e.is_timeout() {
                    format!("{} timed out", request.url)
                } else {
                    format!("{} unreachable: {e}", request.url)
                };
                result.logs.push(LogEntry {
                    kind: "error".to_string(),
                    timestamp: epoch_millis(),
                    message: message.clone(),
                });
                result.errors.push(SiteError::new(ErrorKind::Down, message));
            }
        }

        Ok(request.filter(result))
    }
}
