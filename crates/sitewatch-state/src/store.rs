//! The `Store` seam: dedup keys, the append-only job log, and the change
//! channel used to trigger checks from outside the process.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StateResult;

/// Channel that carries JSON site payloads for externally triggered checks.
pub const CHANGES_CHANNEL: &str = "sitewatch:changes";

/// Build the dedup key for a site and error kind: `{url}:{kind}`.
pub fn dedup_key(url: &str, kind: &str) -> String {
    format!("{url}:{kind}")
}

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub channel: String,
    pub payload: String,
}

/// Receiving end of a store subscription.
///
/// Ends (`next` returns `None`) once the backend stops delivering.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

/// Key-value persistence plus pub/sub, shared by every job.
///
/// All methods are suspension points; errors are reported to the caller
/// and the scheduler treats them as fatal.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> StateResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StateResult<()>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> StateResult<bool>;

    /// Append an entry to the job log. Returns its sequence number.
    async fn append(&self, entry: &str) -> StateResult<u64>;

    /// Every job log entry, oldest first.
    async fn job_log(&self) -> StateResult<Vec<String>>;

    /// Publish a payload on [`CHANGES_CHANNEL`].
    async fn publish(&self, payload: &str) -> StateResult<()>;

    async fn subscribe(&self) -> StateResult<Subscription>;
}

/// In-process fan-out for stores without a native pub/sub transport.
#[derive(Clone, Default)]
pub struct PubSubHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>>,
}

impl PubSubHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to every live subscriber. Returns how many received it.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        let event = ChangeEvent {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        Subscription::new(rx)
    }
}
