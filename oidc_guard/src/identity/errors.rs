use thiserror::Error;

use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum IdentityError {
    /// No cached credentials can satisfy the request without the user.
    #[error("Interaction required: {0}")]
    InteractionRequired(String),

    #[error("Token request failed: {0}")]
    Request(String),

    #[error("Identity provider returned {error}: {description}")]
    Provider { error: String, description: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Invalid authorization request: {0}")]
    InvalidRequest(String),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

#[derive(Debug, Error, Clone)]
pub enum TokenValidationError {
    #[error("Invalid token format")]
    InvalidTokenFormat,

    #[error("No matching key found in JWKS")]
    NoMatchingKey,

    #[error("Missing key component: {0}")]
    MissingKeyComponent(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("JWKS fetch error: {0}")]
    JwksFetch(String),

    #[error("JWT error: {0}")]
    Jwt(String),
}

impl From<jsonwebtoken::errors::Error> for TokenValidationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(err.to_string())
    }
}
