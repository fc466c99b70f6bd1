use thiserror::Error;

use crate::config::ConfigurationError;
use crate::identity::{IdentityError, TokenValidationError};
use crate::session::SessionError;
use crate::storage::StorageError;
use crate::utils::UtilError;

/// Failures that leave the core. Redirect rejections and access denials are values, not errors.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Configuration(ConfigurationError),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token validation failed: {0}")]
    TokenValidation(TokenValidationError),

    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(IdentityError),

    #[error("Identity provider error: {0}")]
    Identity(IdentityError),

    #[error("Directory lookup failed: {0}")]
    DirectoryLookup(String),

    #[error("Session error: {0}")]
    Session(SessionError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Utils error: {0}")]
    Utils(UtilError),
}

impl GuardError {
    /// Whether the user should be sent to the unauthorized destination rather than the error one.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::TokenValidation(_))
    }

    /// Log the error and return self
    pub fn log(self) -> Self {
        match &self {
            Self::NotAuthenticated | Self::UnknownResource(_) => tracing::warn!("{}", self),
            _ => tracing::error!("{}", self),
        }
        self
    }
}

// From implementations that log as they convert

impl From<ConfigurationError> for GuardError {
    fn from(err: ConfigurationError) -> Self {
        let error = Self::Configuration(err);
        tracing::error!("{}", error);
        error
    }
}

impl From<TokenValidationError> for GuardError {
    fn from(err: TokenValidationError) -> Self {
        let error = Self::TokenValidation(err);
        tracing::error!("{}", error);
        error
    }
}

impl From<SessionError> for GuardError {
    fn from(err: SessionError) -> Self {
        let error = Self::Session(err);
        tracing::error!("{}", error);
        error
    }
}

impl From<StorageError> for GuardError {
    fn from(err: StorageError) -> Self {
        let error = Self::Storage(err);
        tracing::error!("{}", error);
        error
    }
}

impl From<UtilError> for GuardError {
    fn from(err: UtilError) -> Self {
        let error = Self::Utils(err);
        tracing::error!("{}", error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_sync_and_send() {
        fn assert_sync_send<T: Sync + Send>() {}
        assert_sync_send::<GuardError>();
    }

    #[test]
    fn test_error_display() {
        let err = GuardError::UnknownResource("mail".to_string());
        assert_eq!(err.to_string(), "Unknown resource: mail");

        let err: GuardError = ConfigurationError::MissingClientSecret.into();
        assert_eq!(err.to_string(), "Configuration error: Missing client secret");
    }

    #[test]
    fn test_authentication_failures() {
        assert!(GuardError::NotAuthenticated.is_authentication_failure());
        assert!(
            GuardError::TokenValidation(TokenValidationError::NoMatchingKey)
                .is_authentication_failure()
        );
        assert!(!GuardError::TokenExchange("x".to_string()).is_authentication_failure());
        assert!(!GuardError::DirectoryLookup("x".to_string()).is_authentication_failure());
    }
}
