use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use super::errors::StorageError;

const KEY_NAMESPACE: &str = "oidc_guard";

/// Serialized payload held by a [`CacheStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheData {
    pub value: String,
}

/// Process-local store. Entries are lost on restart and are not shared between instances.
pub struct InMemoryCacheStore {
    pub(super) entry: HashMap<String, (CacheData, Instant)>,
}

/// Store shared by every instance pointing at the same Redis server.
pub struct RedisCacheStore {
    pub(super) client: redis::Client,
}

/// Key layout shared by every backend: `oidc_guard:<prefix>:<key>`.
pub(super) fn cache_key(prefix: &str, key: &str) -> String {
    format!("{KEY_NAMESPACE}:{prefix}:{key}")
}

/// Expiring key-value storage behind the session repository.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Checks the backend is reachable. Called once when the store is built.
    async fn init(&self) -> Result<(), StorageError>;

    async fn put_with_ttl(
        &mut self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: u64,
    ) -> Result<(), StorageError>;

    /// Unexpired entry under `prefix:key`.
    async fn get(&self, prefix: &str, key: &str) -> Result<Option<CacheData>, StorageError>;

    async fn remove(&mut self, prefix: &str, key: &str) -> Result<(), StorageError>;
}
