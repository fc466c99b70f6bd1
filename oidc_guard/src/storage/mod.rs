mod errors;
mod memory;
mod redis;
mod types;

pub use errors::StorageError;
pub use types::{CacheData, CacheStore, InMemoryCacheStore, RedisCacheStore};

use crate::config::{CACHE_STORE_TYPE, CACHE_STORE_URL};

/// Builds the cache store selected by `OIDC_GUARD_CACHE_STORE_TYPE`.
pub async fn build_default_cache_store() -> Result<Box<dyn CacheStore>, StorageError> {
    build_cache_store(CACHE_STORE_TYPE.as_str(), CACHE_STORE_URL.as_str()).await
}

/// Creates and initializes a cache store. Supported types are `memory` and `redis`.
pub async fn build_cache_store(
    store_type: &str,
    store_url: &str,
) -> Result<Box<dyn CacheStore>, StorageError> {
    tracing::info!("Initializing cache store with type: {}", store_type);

    let store: Box<dyn CacheStore> = match store_type {
        "memory" => Box::new(InMemoryCacheStore::new()),
        "redis" => {
            let client = ::redis::Client::open(store_url)?;
            Box::new(RedisCacheStore::new(client))
        }
        other => return Err(StorageError::UnsupportedStore(other.to_string())),
    };

    store.init().await?;
    tracing::info!("Connected to cache store: type={}", store_type);
    Ok(store)
}
