//! Test doubles shared by the scheduler integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sitewatch_core::{CheckResult, SYSTEM_LOG_TYPE, SiteSpec};
use sitewatch_notify::{Notifier, NotifyError, NotifyResult};
use sitewatch_probe::{ProbeRequest, ProbeResult, Prober};
use sitewatch_scheduler::{CheckLifecycle, LifecycleConfig};
use sitewatch_state::{RedbStore, StateError, StateResult, Store, Subscription};

/// Ordered record of probe and notify events across doubles.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ── Prober ─────────────────────────────────────────────────────────

/// Returns queued results per URL; healthy once a script runs out.
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, VecDeque<CheckResult>>>,
    delay: Option<Duration>,
    events: Events,
}

impl ScriptedProber {
    pub fn new(events: Events) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delay: None,
            events,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(&self, url: &str, results: Vec<CheckResult>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(results);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.events
            .all()
            .iter()
            .filter(|e| *e == &format!("probe-start {url}"))
            .count()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult<CheckResult> {
        self.events.push(format!("probe-start {}", request.url));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|q| q.pop_front())
            .unwrap_or_default();
        self.events.push(format!("probe-end {}", request.url));
        Ok(request.filter(next))
    }
}

// ── Notifier ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel: String,
    pub fixed: bool,
    pub url: String,
    pub retries: u32,
    pub system_logs: usize,
}

pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    events: Events,
}

impl RecordingNotifier {
    pub fn new(events: Events) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay: None,
            events,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: &str, result: &CheckResult, site: &SiteSpec) -> NotifyResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.events
            .push(format!("notify {channel} fixed={} {}", result.fixed, site.url));
        self.sent.lock().unwrap().push(Sent {
            channel: channel.to_string(),
            fixed: result.fixed,
            url: site.url.clone(),
            retries: result.retries,
            system_logs: result
                .logs
                .iter()
                .filter(|l| l.kind == SYSTEM_LOG_TYPE)
                .count(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("receiver unavailable".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ── Store ──────────────────────────────────────────────────────────

/// In-memory redb store that records key writes and can refuse them.
pub struct RecordingStore {
    inner: RedbStore,
    writes: Mutex<Vec<String>>,
    fail_sets: AtomicBool,
    append_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: RedbStore::open_in_memory().unwrap(),
            writes: Mutex::new(Vec::new()),
            fail_sets: AtomicBool::new(false),
            append_delay: Mutex::new(None),
        }
    }

    /// Make every job log append take `delay` before it lands.
    pub fn set_append_delay(&self, delay: Duration) {
        *self.append_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_sets.store(failing, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StateResult<()> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StateError::Write("disk full".to_string()));
        }
        self.writes.lock().unwrap().push(format!("set {key}"));
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        self.writes.lock().unwrap().push(format!("delete {key}"));
        self.inner.delete(key).await
    }

    async fn append(&self, entry: &str) -> StateResult<u64> {
        let delay = *self.append_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.append(entry).await
    }

    async fn job_log(&self) -> StateResult<Vec<String>> {
        self.inner.job_log().await
    }

    async fn publish(&self, payload: &str) -> StateResult<()> {
        self.inner.publish(payload).await
    }

    async fn subscribe(&self) -> StateResult<Subscription> {
        self.inner.subscribe().await
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub events: Events,
    pub prober: Arc<ScriptedProber>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<RecordingStore>,
}

impl Harness {
    pub fn new() -> Self {
        let events = Events::default();
        Self::with_parts(
            ScriptedProber::new(events.clone()),
            RecordingNotifier::new(events.clone()),
            events,
        )
    }

    pub fn with_parts(prober: ScriptedProber, notifier: RecordingNotifier, events: Events) -> Self {
        Self {
            events,
            prober: Arc::new(prober),
            notifier: Arc::new(notifier),
            store: Arc::new(RecordingStore::new()),
        }
    }

    pub fn lifecycle(&self, config: LifecycleConfig) -> CheckLifecycle {
        CheckLifecycle::new(
            self.prober.clone(),
            self.store.clone(),
            self.notifier.clone(),
            config,
        )
    }
}
