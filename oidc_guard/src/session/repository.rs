use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::SESSION_MAX_AGE;
use crate::storage::{CacheData, CacheStore};

use super::errors::SessionError;
use super::types::AuthSession;

const SESSION_PREFIX: &str = "session";

/// Loads and persists [`AuthSession`]s by session id.
#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    async fn load(&self, session_id: &str) -> Result<Option<AuthSession>, SessionError>;

    async fn save(&self, session_id: &str, session: &AuthSession) -> Result<(), SessionError>;

    async fn destroy(&self, session_id: &str) -> Result<(), SessionError>;
}

/// Session repository over any [`CacheStore`]. Entries expire after `OIDC_GUARD_SESSION_MAX_AGE`.
pub struct CacheSessionRepository {
    store: Mutex<Box<dyn CacheStore>>,
    ttl: u64,
}

impl CacheSessionRepository {
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self::with_ttl(store, *SESSION_MAX_AGE)
    }

    pub fn with_ttl(store: Box<dyn CacheStore>, ttl: u64) -> Self {
        Self {
            store: Mutex::new(store),
            ttl,
        }
    }
}

#[async_trait]
impl SessionRepository for CacheSessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<AuthSession>, SessionError> {
        let cached = self
            .store
            .lock()
            .await
            .get(SESSION_PREFIX, session_id)
            .await
            .map_err(SessionError::from)?;

        cached.map(AuthSession::try_from).transpose()
    }

    async fn save(&self, session_id: &str, session: &AuthSession) -> Result<(), SessionError> {
        let data = CacheData::try_from(session)?;
        self.store
            .lock()
            .await
            .put_with_ttl(SESSION_PREFIX, session_id, data, self.ttl)
            .await
            .map_err(SessionError::from)
    }

    async fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        tracing::debug!("Destroying session");
        self.store
            .lock()
            .await
            .remove(SESSION_PREFIX, session_id)
            .await
            .map_err(SessionError::from)
    }
}
