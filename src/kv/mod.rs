//! String key-value store with per-key expiry.
//!
//! Backs the OTP rate limiter. Keys expire independently; a read of an
//! expired key behaves as if the key was never written.

use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info};

mod memory;
mod postgres;

pub use memory::MemoryKeyValueStore;
pub use postgres::PgKeyValueStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write the value and (re)start its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Periodically drop expired entries.
pub fn spawn_kv_sweeper(
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged expired kv entries"),
                Err(err) => error!("kv sweep failed: {err:#}"),
            }
        }
    })
}
