use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::errors::StorageError;
use super::types::{CacheData, CacheStore, RedisCacheStore, cache_key};

impl RedisCacheStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!("Redis connection failed: {}", e);
                StorageError::from(e)
            })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn init(&self) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn put_with_ttl(
        &mut self,
        prefix: &str,
        key: &str,
        value: CacheData,
        ttl: u64,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&value)?;
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(cache_key(prefix, key), payload, ttl).await?;
        Ok(())
    }

    async fn get(&self, prefix: &str, key: &str) -> Result<Option<CacheData>, StorageError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(cache_key(prefix, key)).await?;

        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(StorageError::from)
    }

    async fn remove(&mut self, prefix: &str, key: &str) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(cache_key(prefix, key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_keys_are_namespaced() {
        assert_eq!(cache_key("session", "abc"), "oidc_guard:session:abc");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_init() {
        let client = redis::Client::open("redis://127.0.0.1:1").unwrap();
        let store = RedisCacheStore::new(client);

        let result = store.init().await;
        assert!(matches!(result, Err(StorageError::Connection(_))));
    }
}
