use super::KeyValueStore;
use anyhow::Result;
use async_trait::async_trait;
use moka::{Expiry, future::Cache};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with; a rewrite restarts it.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local TTL store on a `moka` cache.
#[derive(Clone)]
pub struct MemoryKeyValueStore {
    entries: Cache<String, Entry>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().expire_after(EntryTtl).build(),
        }
    }

    /// Entries still held, expired ones included until the next purge.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyValueStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    /// The count is approximate: writes still queued inside the cache are
    /// not reflected until they are applied.
    async fn purge_expired(&self) -> Result<u64> {
        let before = self.entries.entry_count();
        self.entries.run_pending_tasks().await;
        Ok(before.saturating_sub(self.entries.entry_count()))
    }
}
