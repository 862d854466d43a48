//! sitewatch.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::SiteSpec;

pub const DEFAULT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_MAX_RUNS: u32 = 3;
pub const DEFAULT_STATUS_PORT: u16 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitewatchConfig {
    /// Redis URL. When set, the redis backend is used instead of redb.
    #[serde(default, alias = "redisConnection")]
    pub redis_connection: Option<String>,
    #[serde(default)]
    pub sites: Vec<SiteSpec>,
    /// Producer interval in milliseconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// URL pinged once at the start of every probe attempt.
    #[serde(default)]
    pub healthchecker: Option<String>,
    #[serde(default, alias = "killSecret")]
    pub kill_secret: Option<String>,
    #[serde(default, alias = "killPort")]
    pub kill_port: Option<u16>,
    #[serde(default, alias = "browserWSEndpoint")]
    pub browser_ws_endpoint: Option<String>,
    #[serde(default = "default_status_port", alias = "statusPort")]
    pub status_port: u16,
    #[serde(default = "default_data_dir", alias = "dataDir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_runs", alias = "defaultMaxRuns")]
    pub default_max_runs: u32,
    #[serde(default = "default_probe_timeout", alias = "probeTimeoutMs")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_notify_timeout", alias = "notifyTimeoutMs")]
    pub notify_timeout_ms: u64,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook receiving one JSON POST per notification.
    pub webhook: Option<String>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_status_port() -> u16 {
    DEFAULT_STATUS_PORT
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/sitewatch")
}

fn default_max_runs() -> u32 {
    DEFAULT_MAX_RUNS
}

fn default_probe_timeout() -> u64 {
    60_000
}

fn default_notify_timeout() -> u64 {
    30_000
}

impl SitewatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SitewatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.interval == 0 {
            anyhow::bail!("interval must be greater than zero");
        }
        for (i, site) in self.sites.iter().enumerate() {
            if site.url.trim().is_empty() {
                anyhow::bail!("site #{i} has an empty url");
            }
        }
        if self.kill_port.is_some() && self.kill_secret.is_none() {
            anyhow::bail!("kill_port is set but kill_secret is missing");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// An empty config with every default applied.
    pub fn minimal() -> Self {
        SitewatchConfig {
            redis_connection: None,
            sites: Vec::new(),
            interval: DEFAULT_INTERVAL_MS,
            healthchecker: None,
            kill_secret: None,
            kill_port: None,
            browser_ws_endpoint: None,
            status_port: DEFAULT_STATUS_PORT,
            data_dir: default_data_dir(),
            default_max_runs: DEFAULT_MAX_RUNS,
            probe_timeout_ms: default_probe_timeout(),
            notify_timeout_ms: default_notify_timeout(),
            notify: NotifyConfig::default(),
        }
    }
}
