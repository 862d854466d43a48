//! RedisStore — shared Redis backend, for deployments where several
//! processes publish change events or inspect dedup keys.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::store::{CHANGES_CHANNEL, ChangeEvent, Store, Subscription};

/// Redis list holding the job log.
pub const JOB_LOG_KEY: &str = "sitewatch:joblog";

fn backend_err(e: redis::RedisError) -> StateError {
    StateError::Backend(e.to_string())
}

/// Commands share one multiplexed connection; each call works on a clone.
/// Subscriptions open their own dedicated connection.
pub struct RedisStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Open the client and its command connection.
    pub async fn connect(redis_url: &str) -> StateResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| StateError::Open(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StateError::Open(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> StateResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_err)
    }

    async fn set(&self, key: &str, value: &str) -> StateResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(backend_err)
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await.map_err(backend_err)?;
        Ok(removed > 0)
    }

    async fn append(&self, entry: &str) -> StateResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.rpush(JOB_LOG_KEY, entry).await.map_err(backend_err)?;
        Ok(len.saturating_sub(1))
    }

    async fn job_log(&self) -> StateResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(JOB_LOG_KEY, 0, -1).await.map_err(backend_err)
    }

    async fn publish(&self, payload: &str) -> StateResult<()> {
        let mut conn = self.conn.clone();
        let receivers: u64 = conn
            .publish(CHANGES_CHANNEL, payload)
            .await
            .map_err(backend_err)?;
        debug!(receivers, "change event published");
        Ok(())
    }

    async fn subscribe(&self) -> StateResult<Subscription> {
        #[allow(deprecated)]
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| StateError::Subscribe(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(CHANGES_CHANNEL)
            .await
            .map_err(|e| StateError::Subscribe(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "undecodable redis message dropped");
                        continue;
                    }
                };
                let event = ChangeEvent {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("redis subscription closed");
        });

        Ok(Subscription::new(rx))
    }
}
