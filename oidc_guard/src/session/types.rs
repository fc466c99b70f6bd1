use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::identity::{Account, AuthCodeTokenRequest, AuthCodeUrlRequest};
use crate::storage::CacheData;

use super::errors::SessionError;

/// Per-user authentication state, persisted between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub is_authenticated: bool,
    pub account: Option<Account>,
    /// Set when sign-in starts and compared against every returning state envelope.
    pub nonce: Option<String>,
    pub auth_code_request: Option<AuthCodeUrlRequest>,
    pub token_request: Option<AuthCodeTokenRequest>,
    #[serde(default)]
    pub remote_resources: HashMap<String, ResourceToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceToken {
    pub scopes: Vec<String>,
    pub access_token: Option<String>,
    /// The token came from an interactive step and the route that asked for it
    /// has not picked it up yet.
    #[serde(default)]
    pub interactive: bool,
}

impl AuthSession {
    /// Access token previously acquired for `resource_name`.
    pub fn access_token(&self, resource_name: &str) -> Option<&str> {
        self.remote_resources
            .get(resource_name)
            .and_then(|r| r.access_token.as_deref())
    }
}

impl TryFrom<&AuthSession> for CacheData {
    type Error = SessionError;

    fn try_from(session: &AuthSession) -> Result<Self, Self::Error> {
        let value = serde_json::to_string(session)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        Ok(Self { value })
    }
}

impl TryFrom<CacheData> for AuthSession {
    type Error = SessionError;

    fn try_from(data: CacheData) -> Result<Self, Self::Error> {
        serde_json::from_str(&data.value).map_err(|e| {
            tracing::warn!("Stored session is unreadable: {}", e);
            SessionError::Serialization(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_lookup() {
        let mut session = AuthSession::default();
        assert_eq!(session.access_token("graphAPI"), None);

        session.remote_resources.insert(
            "graphAPI".to_string(),
            ResourceToken {
                scopes: vec!["User.Read".to_string()],
                access_token: None,
                interactive: false,
            },
        );
        assert_eq!(session.access_token("graphAPI"), None);

        session
            .remote_resources
            .get_mut("graphAPI")
            .unwrap()
            .access_token = Some("at".to_string());
        assert_eq!(session.access_token("graphAPI"), Some("at"));
    }

    #[test]
    fn test_cache_data_conversion_preserves_session() {
        // Given a session with a nonce and a resource entry
        let mut session = AuthSession {
            nonce: Some("n".to_string()),
            ..Default::default()
        };
        session.remote_resources.insert(
            "api".to_string(),
            ResourceToken {
                scopes: vec!["s".to_string()],
                access_token: Some("t".to_string()),
                interactive: true,
            },
        );

        // When stored and loaded back
        let data = CacheData::try_from(&session).unwrap();
        let loaded = AuthSession::try_from(data).unwrap();

        // Then nothing is lost
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_sessions_stored_before_the_interactive_flag_still_load() {
        let data = CacheData {
            value: r#"{"is_authenticated":true,"account":null,"nonce":"n","auth_code_request":null,"token_request":null,"remote_resources":{"api":{"scopes":["s"],"access_token":"t"}}}"#.to_string(),
        };

        let session = AuthSession::try_from(data).unwrap();
        assert!(!session.remote_resources["api"].interactive);
        assert_eq!(session.access_token("api"), Some("t"));
    }

    #[test]
    fn test_corrupt_cache_data_is_an_error() {
        let data = CacheData {
            value: "{not json".to_string(),
        };
        assert!(matches!(AuthSession::try_from(data), Err(SessionError::Serialization(_))));
    }
}
