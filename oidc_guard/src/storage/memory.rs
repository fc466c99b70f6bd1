use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::errors::StorageError;
use super::types::{CacheData, CacheStore, InMemoryCacheStore, cache_key};

impl InMemoryCacheStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory cache store");
        Self {
            entry: HashMap::new(),
        }
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entry.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put_with_ttl(
        &mut self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: u64,
    ) -> Result<(), StorageError> {
        self.purge_expired();
        let expires_at = Instant::now() + Duration::from_secs(ttl);
        self.entry
            .insert(cache_key(prefix, key), (value, expires_at));
        Ok(())
    }

    async fn get(&self, prefix: &str, key: &str) -> Result<Option<CacheData>, StorageError> {
        let key = cache_key(prefix, key);
        Ok(self
            .entry
            .get(&key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(data, _)| data.clone()))
    }

    async fn remove(&mut self, prefix: &str, key: &str) -> Result<(), StorageError> {
        self.entry.remove(&cache_key(prefix, key));
        Ok(())
    }
}
