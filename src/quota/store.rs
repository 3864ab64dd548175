//! Quota Stores
//!
//! Contracts for the usage log and the config store, plus in-memory
//! implementations. The usage log is append-only per key and range-queryable
//! by timestamp; expired records are removed by a periodic sweep.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use super::clock::Clock;
use super::error::StoreError;
use super::types::{ServiceConfig, UsageKey, UsageRecord};

/// Append-only log of admitted request timestamps
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// All records for `key` with `timestamp >= since`
    async fn query(&self, key: &UsageKey, since: i64) -> Result<Vec<UsageRecord>, StoreError>;

    /// Add one record. Not idempotent.
    async fn append(&self, record: UsageRecord) -> Result<(), StoreError>;

    /// Delete all records for `key` with `timestamp < before`, returning how many went
    async fn purge(&self, key: &UsageKey, before: i64) -> Result<usize, StoreError>;
}

/// Key-value store of custom service configs
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, service_id: &str) -> Result<Option<ServiceConfig>, StoreError>;

    /// Insert or overwrite
    async fn put(&self, config: ServiceConfig) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<Vec<ServiceConfig>, StoreError>;

    /// Returns whether an entry existed
    async fn delete(&self, service_id: &str) -> Result<bool, StoreError>;
}

/// In-memory usage log
#[derive(Debug, Clone, Default)]
pub struct MemoryUsageStore {
    records: Arc<RwLock<HashMap<UsageKey, Vec<UsageRecord>>>>,
}

impl MemoryUsageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record whose retention has elapsed
    pub async fn evict_expired(&self, now: i64) -> usize {
        let mut records = self.records.write().await;
        let mut evicted = 0;

        records.retain(|_, log| {
            let before = log.len();
            log.retain(|r| !r.is_expired(now));
            evicted += before - log.len();
            !log.is_empty()
        });

        evicted
    }

    /// Run `evict_expired` every `interval` until the handle is aborted
    pub fn spawn_eviction_task(&self, clock: Arc<dyn Clock>, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired(clock.now_millis()).await;
                if evicted > 0 {
                    debug!(evicted, "Evicted expired usage records");
                }
            }
        })
    }

    /// Number of keys with at least one record
    pub async fn key_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Total records across all keys
    pub async fn record_count(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn query(&self, key: &UsageKey, since: i64) -> Result<Vec<UsageRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(key)
            .map(|log| log.iter().filter(|r| r.timestamp >= since).cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, record: UsageRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.entry(record.key.clone()).or_default().push(record);
        Ok(())
    }

    async fn purge(&self, key: &UsageKey, before: i64) -> Result<usize, StoreError> {
        let mut records = self.records.write().await;
        let Some(log) = records.get_mut(key) else {
            return Ok(0);
        };

        let len = log.len();
        log.retain(|r| r.timestamp >= before);
        let purged = len - log.len();

        if log.is_empty() {
            records.remove(key);
        }

        Ok(purged)
    }
}

/// In-memory config store
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    configs: Arc<RwLock<HashMap<String, ServiceConfig>>>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored configs
    pub async fn count(&self) -> usize {
        self.configs.read().await.len()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, service_id: &str) -> Result<Option<ServiceConfig>, StoreError> {
        Ok(self.configs.read().await.get(service_id).cloned())
    }

    async fn put(&self, config: ServiceConfig) -> Result<(), StoreError> {
        let mut configs = self.configs.write().await;
        configs.insert(config.service_id.clone(), config);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ServiceConfig>, StoreError> {
        Ok(self.configs.read().await.values().cloned().collect())
    }

    async fn delete(&self, service_id: &str) -> Result<bool, StoreError> {
        Ok(self.configs.write().await.remove(service_id).is_some())
    }
}
