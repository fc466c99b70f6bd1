//! Central configuration for the oidc_guard crate
//!
//! Application settings are read from a JSON document (camelCase keys) and
//! validated once at startup. Process-level knobs that rarely change between
//! deployments (cookie name, cache backend) are plain environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::access::AccessRule;
use crate::resources::{ResourceConfig, find_duplicate_scopes};

/// Scopes requested on every sign-in.
pub const OIDC_DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Environment variable that overrides `appCredentials.clientSecret`.
pub const CLIENT_SECRET_ENV: &str = "OIDC_GUARD_CLIENT_SECRET";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_MEMBER_OF_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me/memberOf";
const KNOWN_TENANT_ALIASES: [&str; 3] = ["common", "organizations", "consumers"];

pub static SESSION_COOKIE_NAME: LazyLock<String> = LazyLock::new(|| {
    std::env::var("OIDC_GUARD_SESSION_COOKIE_NAME")
        .ok()
        .unwrap_or("__Host-GuardSessionId".to_string())
});

pub static SESSION_MAX_AGE: LazyLock<u64> = LazyLock::new(|| {
    std::env::var("OIDC_GUARD_SESSION_MAX_AGE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3600) // One hour if not set or invalid
});

pub static CACHE_STORE_TYPE: LazyLock<String> = LazyLock::new(|| {
    std::env::var("OIDC_GUARD_CACHE_STORE_TYPE")
        .ok()
        .unwrap_or("memory".to_string())
});

pub static CACHE_STORE_URL: LazyLock<String> = LazyLock::new(|| {
    std::env::var("OIDC_GUARD_CACHE_STORE_URL")
        .ok()
        .unwrap_or("redis://127.0.0.1:6379".to_string())
});

/// Fatal setup problems. These are reported once at startup and never at request time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Failed to read settings: {0}")]
    Read(String),

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Invalid client id: {0}")]
    InvalidClientId(String),

    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),

    #[error("Missing client secret")]
    MissingClientSecret,

    #[error("Invalid redirect uri: {0}")]
    InvalidRedirectUri(String),

    #[error("Invalid route for {name}: {value}")]
    InvalidRoute { name: String, value: String },

    #[error("Resources {0} and {1} are configured with the same scopes")]
    DuplicateResourceScopes(String, String),

    #[error("Access rule {0} allows no methods")]
    EmptyAccessRule(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCredentials {
    pub client_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRoutes {
    /// Absolute redirect URI registered with the identity provider.
    pub redirect: String,
    pub error: String,
    pub unauthorized: String,
    #[serde(default = "default_root")]
    pub post_login: String,
    #[serde(default = "default_root")]
    pub post_logout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySettings {
    #[serde(default = "default_member_of_endpoint")]
    pub member_of_endpoint: String,
    #[serde(default = "default_directory_scopes")]
    pub scopes: Vec<String>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            member_of_endpoint: default_member_of_endpoint(),
            scopes: default_directory_scopes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardSettings {
    pub app_credentials: AppCredentials,
    pub auth_routes: AuthRoutes,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default)]
    pub remote_resources: HashMap<String, ResourceConfig>,
    #[serde(default)]
    pub owned_resources: HashMap<String, ResourceConfig>,
    #[serde(default)]
    pub access_matrix: HashMap<String, AccessRule>,
    #[serde(default)]
    pub directory: DirectorySettings,
}

fn default_root() -> String {
    "/".to_string()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_member_of_endpoint() -> String {
    DEFAULT_MEMBER_OF_ENDPOINT.to_string()
}

fn default_directory_scopes() -> Vec<String> {
    vec!["User.Read".to_string(), "GroupMember.Read.All".to_string()]
}

impl GuardSettings {
    /// Parses settings and applies the client secret override from the environment.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let mut settings: GuardSettings =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;

        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            tracing::debug!("Using client secret from {}", CLIENT_SECRET_ENV);
            settings.app_credentials.client_secret = secret;
        }

        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        tracing::info!("Loading guard settings from {}", path.display());
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Read(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.authority_host.trim_end_matches('/'),
            self.app_credentials.tenant_id
        )
    }

    /// Path component of the redirect URI, where the redirect handler is mounted.
    pub fn redirect_path(&self) -> String {
        Url::parse(&self.auth_routes.redirect)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| self.auth_routes.redirect.clone())
    }

    /// Absolute URL the provider sends the browser to after logout.
    pub fn post_logout_uri(&self) -> String {
        match Url::parse(&self.auth_routes.redirect)
            .and_then(|base| base.join(&self.auth_routes.post_logout))
        {
            Ok(url) => url.to_string(),
            Err(_) => self.auth_routes.post_logout.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let creds = &self.app_credentials;

        if uuid::Uuid::parse_str(&creds.client_id).is_err() {
            return Err(ConfigurationError::InvalidClientId(creds.client_id.clone()));
        }

        if !is_valid_tenant(&creds.tenant_id) {
            return Err(ConfigurationError::InvalidTenantId(creds.tenant_id.clone()));
        }

        if creds.client_secret.trim().is_empty() {
            return Err(ConfigurationError::MissingClientSecret);
        }

        match Url::parse(&self.auth_routes.redirect) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigurationError::InvalidRedirectUri(
                    self.auth_routes.redirect.clone(),
                ));
            }
        }

        let routes = [
            ("error", &self.auth_routes.error),
            ("unauthorized", &self.auth_routes.unauthorized),
            ("postLogin", &self.auth_routes.post_login),
            ("postLogout", &self.auth_routes.post_logout),
        ];
        for (name, value) in routes {
            if !value.starts_with('/') {
                return Err(ConfigurationError::InvalidRoute {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
        }

        if let Some((a, b)) = find_duplicate_scopes(&self.owned_resources, &self.remote_resources) {
            return Err(ConfigurationError::DuplicateResourceScopes(a, b));
        }

        for (name, rule) in &self.access_matrix {
            if rule.methods.is_empty() {
                return Err(ConfigurationError::EmptyAccessRule(name.clone()));
            }
        }

        Ok(())
    }
}

fn is_valid_tenant(tenant: &str) -> bool {
    uuid::Uuid::parse_str(tenant).is_ok()
        || KNOWN_TENANT_ALIASES.contains(&tenant)
        || (tenant.contains('.') && !tenant.contains('/') && !tenant.starts_with('.'))
}
