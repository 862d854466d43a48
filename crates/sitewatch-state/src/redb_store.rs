//! RedbStore — embedded persistence for dedup keys and the job log.
//!
//! Supports both on-disk and in-memory backends (the latter for testing).
//! Change events are fanned out in-process through a [`PubSubHub`], so
//! publishers and subscribers must share one `RedbStore` (it is `Clone`).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{CHANGES_CHANNEL, PubSubHub, Store, Subscription};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    hub: PubSubHub,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            hub: PubSubHub::new(),
        };
        store.ensure_tables()?;
        debug!(?path, "store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            hub: PubSubHub::new(),
        };
        store.ensure_tables()?;
        debug!("in-memory store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(DEDUP_KEYS).map_err(map_err!(Table))?;
        txn.open_table(JOB_LOG).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Dedup keys ─────────────────────────────────────────────────

    fn get_key(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEDUP_KEYS).map_err(map_err!(Table))?;
        let value = table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    fn put_key(&self, key: &str, value: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEDUP_KEYS).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "dedup key stored");
        Ok(())
    }

    fn remove_key(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(DEDUP_KEYS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "dedup key deleted");
        Ok(existed)
    }

    // ── Job log ────────────────────────────────────────────────────

    fn append_entry(&self, entry: &str) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(JOB_LOG).map_err(map_err!(Table))?;
            seq = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(k, _)| k.value() + 1)
                .unwrap_or(0);
            table.insert(seq, entry).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(seq)
    }

    fn list_entries(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOB_LOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(value.value().to_string());
        }
        Ok(results)
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        self.get_key(key)
    }

    async fn set(&self, key: &str, value: &str) -> StateResult<()> {
        self.put_key(key, value)
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        self.remove_key(key)
    }

    async fn append(&self, entry: &str) -> StateResult<u64> {
        self.append_entry(entry)
    }

    async fn job_log(&self) -> StateResult<Vec<String>> {
        self.list_entries()
    }

    async fn publish(&self, payload: &str) -> StateResult<()> {
        let delivered = self.hub.publish(CHANGES_CHANNEL, payload);
        debug!(delivered, "change event published");
        Ok(())
    }

    async fn subscribe(&self) -> StateResult<Subscription> {
        Ok(self.hub.subscribe())
    }
}
