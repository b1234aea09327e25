//! Persistence collaborator for cached syncs and tagging rules.
//!
//! The sync and rule layers only need key-based reads and upserts, so the
//! store is a narrow async trait. [`MemoryStore`] is the in-process
//! implementation; cache entries expire on `tokio::time::Instant` so tests
//! running on a paused clock can step past the TTL.

use crate::errors::DirectoryResult;
use crate::types::{SyncResult, TaggingRule};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Key-based store for segment snapshots and rule definitions
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Cached sync for `key`, if present and not expired
    async fn get_cached_sync(&self, key: &str) -> DirectoryResult<Option<SyncResult>>;

    /// Upsert a cached sync that expires after `ttl`
    async fn put_cached_sync(&self, key: &str, result: &SyncResult, ttl: Duration)
        -> DirectoryResult<()>;

    /// Rule by identifier
    async fn get_rule(&self, id: &str) -> DirectoryResult<Option<TaggingRule>>;

    /// All rules with the active flag set
    async fn list_active_rules(&self) -> DirectoryResult<Vec<TaggingRule>>;

    /// Upsert a rule by identifier
    async fn put_rule(&self, rule: TaggingRule) -> DirectoryResult<()>;
}

struct CachedSync {
    result: SyncResult,
    expires_at: Instant,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    syncs: RwLock<HashMap<String, CachedSync>>,
    rules: RwLock<Vec<TaggingRule>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with rules
    pub fn with_rules(rules: impl IntoIterator<Item = TaggingRule>) -> Self {
        let store = Self::new();
        {
            let mut stored = store.rules.write();
            for rule in rules {
                upsert(&mut stored, rule);
            }
        }
        store
    }

    /// Drop a cached sync
    pub fn invalidate(&self, key: &str) -> bool {
        self.syncs.write().remove(key).is_some()
    }

    /// Number of live cache entries
    pub fn cached_len(&self) -> usize {
        let now = Instant::now();
        self.syncs
            .read()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }
}

fn upsert(rules: &mut Vec<TaggingRule>, rule: TaggingRule) {
    match rules.iter_mut().find(|r| r.id == rule.id) {
        Some(existing) => *existing = rule,
        None => rules.push(rule),
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get_cached_sync(&self, key: &str) -> DirectoryResult<Option<SyncResult>> {
        let now = Instant::now();
        {
            let syncs = self.syncs.read();
            match syncs.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.result.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        debug!(key, "Evicting expired sync");
        self.syncs.write().remove(key);
        Ok(None)
    }

    async fn put_cached_sync(
        &self,
        key: &str,
        result: &SyncResult,
        ttl: Duration,
    ) -> DirectoryResult<()> {
        self.syncs.write().insert(
            key.to_string(),
            CachedSync {
                result: result.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_rule(&self, id: &str) -> DirectoryResult<Option<TaggingRule>> {
        Ok(self.rules.read().iter().find(|r| r.id == id).cloned())
    }

    async fn list_active_rules(&self) -> DirectoryResult<Vec<TaggingRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn put_rule(&self, rule: TaggingRule) -> DirectoryResult<()> {
        upsert(&mut self.rules.write(), rule);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("cached_syncs", &self.syncs.read().len())
            .field("rules", &self.rules.read().len())
            .finish()
    }
}
