use thiserror::Error;

use crate::storage::StorageError;
use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum SessionError {
    #[error("Session store failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Session could not be (de)serialized: {0}")]
    Serialization(String),

    #[error("Session cookie error: {0}")]
    Cookie(String),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}
