use std::sync::Arc;

use crate::config::GuardSettings;
use crate::directory::{DirectoryFetcher, GraphFetcher};
use crate::identity::{EntraClient, IdentityClient, JwksTokenValidator, TokenValidator};
use crate::resources::{ResourceConfig, resolve_resource_name};
use crate::session::{CacheSessionRepository, SessionRepository};
use crate::storage::build_default_cache_store;

use super::errors::GuardError;

/// Entry point for every authentication and authorization operation.
///
/// Holds the validated settings and the external collaborators. Cheap to share
/// behind an `Arc`; it keeps no per-request state.
pub struct AuthProvider {
    pub(super) settings: GuardSettings,
    pub(super) identity: Arc<dyn IdentityClient>,
    pub(super) validator: Arc<dyn TokenValidator>,
    pub(super) fetcher: Arc<dyn DirectoryFetcher>,
    pub(super) sessions: Arc<dyn SessionRepository>,
}

impl AuthProvider {
    /// Validates `settings` and wires the given collaborators.
    pub fn new(
        settings: GuardSettings,
        identity: Arc<dyn IdentityClient>,
        validator: Arc<dyn TokenValidator>,
        fetcher: Arc<dyn DirectoryFetcher>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Result<Self, GuardError> {
        settings.validate()?;
        tracing::info!(
            "Auth provider configured for authority {} with {} access rules",
            settings.authority(),
            settings.access_matrix.len()
        );

        Ok(Self {
            settings,
            identity,
            validator,
            fetcher,
            sessions,
        })
    }

    /// Default collaborators: Entra client, JWKS validator, Graph fetcher and the
    /// cache store selected by `OIDC_GUARD_CACHE_STORE_TYPE`.
    pub async fn from_settings(settings: GuardSettings) -> Result<Self, GuardError> {
        settings.validate()?;
        let store = build_default_cache_store().await?;

        let identity = Arc::new(EntraClient::new(&settings));
        let validator = Arc::new(JwksTokenValidator::new(&settings));
        Self::new(
            settings,
            identity,
            validator,
            Arc::new(GraphFetcher::new()),
            Arc::new(CacheSessionRepository::new(store)),
        )
    }

    pub fn settings(&self) -> &GuardSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &dyn SessionRepository {
        self.sessions.as_ref()
    }

    /// Configuration of a remote or owned resource by name. Remote resources win on a name clash.
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.settings
            .remote_resources
            .get(name)
            .or_else(|| self.settings.owned_resources.get(name))
    }

    pub(super) fn resource_name_for_scopes(&self, scopes: &[String]) -> Option<String> {
        resolve_resource_name(
            scopes,
            &self.settings.owned_resources,
            &self.settings.remote_resources,
        )
    }

    /// Local path to redirect to, falling back to the post-login route for anything
    /// that could leave the site.
    pub(super) fn local_path(&self, path: &str) -> String {
        if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
            path.to_string()
        } else {
            tracing::warn!("Refusing non-local redirect path {:?}", path);
            self.settings.auth_routes.post_login.clone()
        }
    }
}
