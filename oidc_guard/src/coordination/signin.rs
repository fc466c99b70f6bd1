use url::Url;

use crate::config::OIDC_DEFAULT_SCOPES;
use crate::identity::{AuthCodeTokenRequest, AuthCodeUrlRequest};
use crate::session::AuthSession;
use crate::state::{AppStage, StateEnvelope};
use crate::utils::{UtilError, gen_random_string, pkce_challenge};

use super::errors::GuardError;
use super::provider::AuthProvider;

impl AuthProvider {
    /// Starts interactive sign-in and returns the provider URL to redirect to.
    pub async fn sign_in(&self, session: &mut AuthSession) -> Result<String, GuardError> {
        let nonce = gen_random_string(32)?;
        session.nonce = Some(nonce.clone());
        session.is_authenticated = false;

        let state = StateEnvelope::new(
            AppStage::SignIn,
            self.settings.auth_routes.post_login.clone(),
            nonce,
        )
        .encode()?;

        let scopes = OIDC_DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        tracing::debug!("Starting sign-in");
        self.get_auth_code(session, scopes, state, None).await
    }

    /// Destroys the session, drops the account's cached tokens and returns the
    /// provider logout URL.
    pub async fn sign_out(&self, session_id: &str) -> Result<String, GuardError> {
        match self.sessions.load(session_id).await {
            Ok(Some(AuthSession {
                account: Some(account),
                ..
            })) => self.identity.remove_account(&account.home_account_id).await,
            Ok(_) => {}
            Err(e) => tracing::warn!("Signing out a session that could not be read: {}", e),
        }

        self.sessions.destroy(session_id).await?;
        tracing::debug!("Signed out, redirecting to provider logout");
        self.logout_url()
    }

    /// Provider logout URL that returns the browser to the post-logout route.
    pub fn logout_url(&self) -> Result<String, GuardError> {
        let endpoint = format!("{}/oauth2/v2.0/logout", self.settings.authority());
        let url = Url::parse_with_params(
            &endpoint,
            &[("post_logout_redirect_uri", self.settings.post_logout_uri())],
        )
        .map_err(|e| GuardError::from(UtilError::Format(e.to_string())))?;

        Ok(url.to_string())
    }

    /// Prepares the pending requests for an authorization-code round trip and
    /// returns the authorization URL.
    pub(crate) async fn get_auth_code(
        &self,
        session: &mut AuthSession,
        scopes: Vec<String>,
        state: String,
        login_hint: Option<String>,
    ) -> Result<String, GuardError> {
        let authority = self.settings.authority();
        let redirect_uri = self.settings.auth_routes.redirect.clone();

        let code_verifier = gen_random_string(32)?;
        let code_challenge = pkce_challenge(&code_verifier);

        let auth_code_request = session
            .auth_code_request
            .get_or_insert_with(|| AuthCodeUrlRequest {
                authority: authority.clone(),
                scopes: Vec::new(),
                state: String::new(),
                redirect_uri: redirect_uri.clone(),
                code_challenge: String::new(),
                login_hint: None,
                prompt: None,
            });
        auth_code_request.scopes = scopes.clone();
        auth_code_request.state = state;
        auth_code_request.code_challenge = code_challenge;
        auth_code_request.login_hint = login_hint;

        let token_request = session
            .token_request
            .get_or_insert_with(|| AuthCodeTokenRequest {
                authority,
                scopes: Vec::new(),
                redirect_uri,
                code: None,
                code_verifier: String::new(),
            });
        token_request.scopes = scopes;
        token_request.code = None;
        token_request.code_verifier = code_verifier;

        self.identity
            .get_authorization_url(auth_code_request)
            .await
            .map_err(|e| GuardError::Identity(e).log())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRepository;
    use crate::test_utils::{sample_account, sample_settings, test_provider};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_sign_in_prepares_session_and_url() {
        // Given a fresh session
        let harness = test_provider(sample_settings()).unwrap();
        let mut session = AuthSession::default();

        // When signing in
        let url = harness.provider.sign_in(&mut session).await.unwrap();

        // Then the session holds a nonce and the pending requests
        let nonce = session.nonce.clone().unwrap();
        assert!(!session.is_authenticated);
        let auth_request = session.auth_code_request.clone().unwrap();
        let token_request = session.token_request.clone().unwrap();
        assert_eq!(auth_request.scopes, vec!["openid", "profile", "offline_access"]);
        assert_eq!(token_request.scopes, auth_request.scopes);
        assert_eq!(
            auth_request.code_challenge,
            pkce_challenge(&token_request.code_verifier)
        );

        // And the state envelope carries the sign-in stage and nonce
        let envelope = StateEnvelope::decode(&auth_request.state).unwrap();
        assert_eq!(envelope.stage, AppStage::SignIn);
        assert_eq!(envelope.nonce, nonce);
        assert_eq!(envelope.path, "/");

        // And the URL targets the authority's authorize endpoint
        let parsed = Url::parse(&url).unwrap();
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert!(url.starts_with(&harness.provider.settings().authority()));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["state"], auth_request.state);
    }

    #[tokio::test]
    async fn test_sign_in_twice_rotates_nonce_and_verifier() {
        let harness = test_provider(sample_settings()).unwrap();
        let mut session = AuthSession::default();

        harness.provider.sign_in(&mut session).await.unwrap();
        let first_nonce = session.nonce.clone();
        let first_verifier = session.token_request.clone().unwrap().code_verifier;

        harness.provider.sign_in(&mut session).await.unwrap();
        assert_ne!(session.nonce, first_nonce);
        assert_ne!(session.token_request.unwrap().code_verifier, first_verifier);
    }

    #[tokio::test]
    async fn test_sign_out_destroys_session() {
        // Given a stored session
        let harness = test_provider(sample_settings()).unwrap();
        harness
            .sessions
            .save("sid", &AuthSession::default())
            .await
            .unwrap();

        // When signing out
        let url = harness.provider.sign_out("sid").await.unwrap();

        // Then the session is gone and the logout URL carries the post-logout redirect
        assert!(harness.sessions.load("sid").await.unwrap().is_none());
        let parsed = Url::parse(&url).unwrap();
        assert!(parsed.path().ends_with("/oauth2/v2.0/logout"));
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(query["post_logout_redirect_uri"], "http://localhost:3000/");
        // Nothing was cached for a session without an account
        assert!(harness.identity.removed_accounts().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_drops_cached_tokens_for_the_account() {
        // Given a signed-in session
        let harness = test_provider(sample_settings()).unwrap();
        let session = AuthSession {
            is_authenticated: true,
            account: Some(sample_account()),
            ..Default::default()
        };
        harness.sessions.save("sid", &session).await.unwrap();

        // When signing out
        harness.provider.sign_out("sid").await.unwrap();

        // Then the identity client forgets that account's tokens
        assert_eq!(
            harness.identity.removed_accounts(),
            vec![sample_account().home_account_id]
        );
        assert!(harness.sessions.load("sid").await.unwrap().is_none());
    }
}
