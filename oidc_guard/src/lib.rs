//! oidc_guard - OAuth2/OIDC sign-in and access control for web applications
//!
//! This crate coordinates interactive sign-in against a Microsoft Entra style
//! identity provider, silent and on-behalf-of token acquisition for downstream
//! resources, and claim-based access checks (groups and app roles, including
//! group claims overage resolved through the directory).
//!
//! Framework integration lives in `oidc-guard-axum`.

mod access;
mod config;
mod coordination;
mod directory;
mod identity;
mod resources;
mod session;
mod state;
mod storage;
mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use access::{
    AccessDecision, AccessRule, CredentialKind, DenyReason, claim_values, evaluate,
    has_overage_indicator, materialize_groups,
};

pub use config::{
    AppCredentials, AuthRoutes, CLIENT_SECRET_ENV, ConfigurationError, DirectorySettings,
    GuardSettings, OIDC_DEFAULT_SCOPES, SESSION_COOKIE_NAME, SESSION_MAX_AGE,
};

pub use coordination::{
    AuthProvider, GuardError, RedirectOutcome, RedirectQuery, RedirectRejection, TokenAcquisition,
};

pub use directory::{DirectoryFetcher, FetchError, GraphFetcher};

pub use identity::{
    Account, AuthCodeTokenRequest, AuthCodeUrlRequest, EntraClient, IdentityClient,
    IdentityError, JwksTokenValidator, OboRequest, SilentRequest, TokenResponse,
    TokenValidationError, TokenValidator, build_authorization_url,
};

pub use resources::{ResourceConfig, resolve_resource_name};

pub use session::{
    AuthSession, CacheSessionRepository, ResourceToken, SessionError, SessionRepository,
    clear_session_cookie, get_session_id_from_headers, new_session_id, set_session_cookie,
};

pub use state::{AppStage, StateEnvelope};

pub use storage::{
    CacheData, CacheStore, InMemoryCacheStore, RedisCacheStore, StorageError, build_cache_store,
    build_default_cache_store,
};
