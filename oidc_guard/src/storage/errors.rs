use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("Cache store connection failed: {0}")]
    Connection(String),

    #[error("Cached value could not be (de)serialized: {0}")]
    Serde(String),

    #[error("Unsupported cache store type: {0}. Supported types are 'memory' and 'redis'")]
    UnsupportedStore(String),
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}
