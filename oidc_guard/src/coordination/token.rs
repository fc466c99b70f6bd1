use crate::identity::{IdentityError, OboRequest, SilentRequest};
use crate::session::{AuthSession, ResourceToken};
use crate::state::{AppStage, StateEnvelope};

use super::errors::GuardError;
use super::provider::AuthProvider;

/// Result of asking for a resource token in the middle of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAcquisition {
    Acquired(String),
    /// The user has to visit `auth_url`; the redirect handler resumes the original route.
    InteractionRequired { auth_url: String },
}

impl AuthProvider {
    /// Acquires a token for `resource_name`, silently when possible.
    ///
    /// A token left by a completed `AcquireToken` round trip is handed out once,
    /// to the request that resumes after it. Otherwise, when silent acquisition
    /// needs the user, the session is prepared for a round trip that returns to
    /// `current_path`.
    pub async fn acquire_token(
        &self,
        session: &mut AuthSession,
        resource_name: &str,
        current_path: &str,
    ) -> Result<TokenAcquisition, GuardError> {
        let scopes = self
            .resource(resource_name)
            .map(|resource| resource.scopes.clone())
            .ok_or_else(|| GuardError::UnknownResource(resource_name.to_string()).log())?;

        let account = session
            .account
            .clone()
            .ok_or_else(|| GuardError::NotAuthenticated.log())?;

        if let Some(token) = take_interactive_token(session, resource_name, &scopes) {
            tracing::debug!("Using token from the interactive step for {}", resource_name);
            return Ok(TokenAcquisition::Acquired(token));
        }

        session.remote_resources.insert(
            resource_name.to_string(),
            ResourceToken {
                scopes: scopes.clone(),
                access_token: None,
                interactive: false,
            },
        );

        let silent = self
            .identity
            .acquire_token_silently(&SilentRequest {
                account: account.clone(),
                scopes: scopes.clone(),
            })
            .await;

        match silent {
            Ok(response) if !response.access_token.is_empty() => {
                tracing::debug!("Silently acquired token for {}", resource_name);
                if let Some(entry) = session.remote_resources.get_mut(resource_name) {
                    entry.access_token = Some(response.access_token.clone());
                }
                Ok(TokenAcquisition::Acquired(response.access_token))
            }
            Ok(_) | Err(IdentityError::InteractionRequired(_)) => {
                tracing::debug!("Interaction required for {}", resource_name);
                let nonce = session.nonce.clone().unwrap_or_default();
                let state = StateEnvelope::new(AppStage::AcquireToken, current_path, nonce).encode()?;
                let auth_url = self
                    .get_auth_code(session, scopes, state, Some(account.username))
                    .await?;
                Ok(TokenAcquisition::InteractionRequired { auth_url })
            }
            Err(e) => Err(GuardError::TokenAcquisition(e).log()),
        }
    }

    /// Exchanges the caller's access token for one scoped to `resource_name`.
    pub async fn acquire_token_on_behalf_of(
        &self,
        assertion: &str,
        resource_name: &str,
    ) -> Result<String, GuardError> {
        let scopes = self
            .resource(resource_name)
            .map(|resource| resource.scopes.clone())
            .ok_or_else(|| GuardError::UnknownResource(resource_name.to_string()).log())?;

        let response = self
            .identity
            .acquire_token_on_behalf_of(&OboRequest {
                assertion: assertion.to_string(),
                scopes,
            })
            .await
            .map_err(|e| GuardError::TokenAcquisition(e).log())?;

        if response.access_token.is_empty() {
            return Err(GuardError::TokenAcquisition(IdentityError::InvalidResponse(
                "Empty access token".to_string(),
            ))
            .log());
        }

        tracing::debug!("Acquired on-behalf-of token for {}", resource_name);
        Ok(response.access_token)
    }
}

/// Hands over the token stored by an interactive step, at most once.
fn take_interactive_token(
    session: &mut AuthSession,
    resource_name: &str,
    scopes: &[String],
) -> Option<String> {
    let entry = session.remote_resources.get_mut(resource_name)?;
    if !entry.interactive || entry.scopes != scopes {
        return None;
    }

    entry.interactive = false;
    entry.access_token.clone().filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::RedirectOutcome;
    use crate::test_utils::{redirect_query_for, sample_account, sample_settings, test_provider};
    use std::collections::HashMap;
    use url::Url;

    fn signed_in_session() -> AuthSession {
        AuthSession {
            is_authenticated: true,
            account: Some(sample_account()),
            nonce: Some("nonce-1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_silent_success() {
        // Given a provider that can refresh silently
        let harness = test_provider(sample_settings()).unwrap();
        harness.identity.set_silent_token("graph-token");
        let mut session = signed_in_session();

        // When acquiring a token for the graph resource
        let result = harness
            .provider
            .acquire_token(&mut session, "graphAPI", "/profile")
            .await
            .unwrap();

        // Then the token is returned and stored
        assert_eq!(result, TokenAcquisition::Acquired("graph-token".to_string()));
        assert_eq!(session.access_token("graphAPI"), Some("graph-token"));
        assert_eq!(harness.identity.silent_scopes(), vec![vec!["User.Read".to_string()]]);
    }

    #[tokio::test]
    async fn test_empty_silent_token_requires_interaction() {
        let harness = test_provider(sample_settings()).unwrap();
        harness.identity.set_silent_token("");
        let mut session = signed_in_session();

        let result = harness
            .provider
            .acquire_token(&mut session, "graphAPI", "/profile")
            .await
            .unwrap();

        assert!(matches!(result, TokenAcquisition::InteractionRequired { .. }));
        assert_eq!(session.access_token("graphAPI"), None);
    }

    #[tokio::test]
    async fn test_interaction_required_builds_acquire_token_redirect() {
        // Given silent acquisition needs the user
        let harness = test_provider(sample_settings()).unwrap();
        harness
            .identity
            .fail_silent(IdentityError::InteractionRequired("consent".to_string()));
        let mut session = signed_in_session();

        // When a protected route asks for the mail resource
        let result = harness
            .provider
            .acquire_token(&mut session, "mailAPI", "/mail")
            .await
            .unwrap();

        // Then the user is sent to the provider with an AcquireToken envelope for the route
        let TokenAcquisition::InteractionRequired { auth_url } = result else {
            panic!("Expected interaction");
        };
        let query: HashMap<String, String> =
            Url::parse(&auth_url).unwrap().query_pairs().into_owned().collect();
        let envelope = StateEnvelope::decode(&query["state"]).unwrap();
        assert_eq!(envelope.stage, AppStage::AcquireToken);
        assert_eq!(envelope.path, "/mail");
        assert_eq!(envelope.nonce, "nonce-1");
        assert_eq!(query["scope"], "Mail.Read");
        assert_eq!(query["login_hint"], sample_account().username);

        // And the pending token request records the resource scopes
        assert_eq!(session.token_request.unwrap().scopes, vec!["Mail.Read"]);
        assert_eq!(session.remote_resources["mailAPI"].access_token, None);
    }

    #[tokio::test]
    async fn test_mid_session_step_resumes_original_route() {
        // Given an interactive step was started for /mail
        let harness = test_provider(sample_settings()).unwrap();
        harness
            .identity
            .fail_silent(IdentityError::InteractionRequired("consent".to_string()));
        harness.identity.set_exchange_access_token("mail-token");
        let mut session = signed_in_session();
        let TokenAcquisition::InteractionRequired { auth_url } = harness
            .provider
            .acquire_token(&mut session, "mailAPI", "/mail")
            .await
            .unwrap()
        else {
            panic!("Expected interaction");
        };

        // When the provider redirects back with the same state
        let outcome = harness
            .provider
            .handle_redirect(&mut session, &redirect_query_for(&auth_url, "CODE"))
            .await
            .unwrap();

        // Then the token lands under mailAPI and the user returns to /mail
        assert_eq!(outcome.location(), "/mail");
        assert!(matches!(outcome, RedirectOutcome::TokenAcquired { .. }));
        assert_eq!(session.access_token("mailAPI"), Some("mail-token"));

        // And the resumed request gets that token even though silent acquisition still fails
        let resumed = harness
            .provider
            .acquire_token(&mut session, "mailAPI", "/mail")
            .await
            .unwrap();
        assert_eq!(resumed, TokenAcquisition::Acquired("mail-token".to_string()));
        assert_eq!(harness.identity.silent_scopes().len(), 1);
    }

    #[tokio::test]
    async fn test_interactive_token_is_handed_out_once() {
        // Given a token stored by a completed interactive step
        let harness = test_provider(sample_settings()).unwrap();
        harness.identity.set_silent_token("");
        let mut session = signed_in_session();
        session.remote_resources.insert(
            "mailAPI".to_string(),
            ResourceToken {
                scopes: vec!["Mail.Read".to_string()],
                access_token: Some("mail-token".to_string()),
                interactive: true,
            },
        );

        // When the resumed route asks for it
        let first = harness
            .provider
            .acquire_token(&mut session, "mailAPI", "/mail")
            .await
            .unwrap();

        // Then it is returned without a silent call
        assert_eq!(first, TokenAcquisition::Acquired("mail-token".to_string()));
        assert!(harness.identity.silent_scopes().is_empty());
        assert!(!session.remote_resources["mailAPI"].interactive);

        // And the next request goes through silent acquisition again
        let second = harness
            .provider
            .acquire_token(&mut session, "mailAPI", "/mail")
            .await
            .unwrap();
        assert!(matches!(second, TokenAcquisition::InteractionRequired { .. }));
        assert_eq!(session.access_token("mailAPI"), None);
    }

    #[tokio::test]
    async fn test_interactive_token_for_other_scopes_is_not_used() {
        let harness = test_provider(sample_settings()).unwrap();
        harness.identity.set_silent_token("graph-token");
        let mut session = signed_in_session();
        session.remote_resources.insert(
            "graphAPI".to_string(),
            ResourceToken {
                scopes: vec!["Mail.Read".to_string()],
                access_token: Some("wrong-audience".to_string()),
                interactive: true,
            },
        );

        let result = harness
            .provider
            .acquire_token(&mut session, "graphAPI", "/profile")
            .await
            .unwrap();
        assert_eq!(result, TokenAcquisition::Acquired("graph-token".to_string()));
    }

    #[tokio::test]
    async fn test_previous_token_is_cleared_before_acquisition() {
        let harness = test_provider(sample_settings()).unwrap();
        harness
            .identity
            .fail_silent(IdentityError::InteractionRequired("expired".to_string()));
        let mut session = signed_in_session();
        session.remote_resources.insert(
            "graphAPI".to_string(),
            ResourceToken {
                scopes: vec!["User.Read".to_string()],
                access_token: Some("old".to_string()),
                interactive: false,
            },
        );

        harness
            .provider
            .acquire_token(&mut session, "graphAPI", "/profile")
            .await
            .unwrap();

        assert_eq!(session.access_token("graphAPI"), None);
    }

    #[tokio::test]
    async fn test_other_silent_failures_propagate() {
        let harness = test_provider(sample_settings()).unwrap();
        harness
            .identity
            .fail_silent(IdentityError::Request("connection reset".to_string()));
        let mut session = signed_in_session();

        let result = harness
            .provider
            .acquire_token(&mut session, "graphAPI", "/profile")
            .await;

        assert!(matches!(
            result,
            Err(GuardError::TokenAcquisition(IdentityError::Request(_)))
        ));
        assert!(session.auth_code_request.is_none());
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let harness = test_provider(sample_settings()).unwrap();
        let mut session = signed_in_session();

        let result = harness
            .provider
            .acquire_token(&mut session, "nope", "/")
            .await;
        assert!(matches!(result, Err(GuardError::UnknownResource(name)) if name == "nope"));
    }

    #[tokio::test]
    async fn test_without_account() {
        let harness = test_provider(sample_settings()).unwrap();
        let mut session = AuthSession::default();

        let result = harness
            .provider
            .acquire_token(&mut session, "graphAPI", "/")
            .await;
        assert!(matches!(result, Err(GuardError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_on_behalf_of() {
        let harness = test_provider(sample_settings()).unwrap();
        harness.identity.set_obo_token("downstream-token");

        let token = harness
            .provider
            .acquire_token_on_behalf_of("caller-token", "graphAPI")
            .await
            .unwrap();

        assert_eq!(token, "downstream-token");
        assert_eq!(harness.identity.obo_assertions(), vec!["caller-token"]);
    }

    #[tokio::test]
    async fn test_on_behalf_of_failure() {
        let harness = test_provider(sample_settings()).unwrap();
        harness.identity.fail_obo(IdentityError::Provider {
            error: "invalid_grant".to_string(),
            description: "assertion expired".to_string(),
        });

        let result = harness
            .provider
            .acquire_token_on_behalf_of("caller-token", "graphAPI")
            .await;
        assert!(matches!(result, Err(GuardError::TokenAcquisition(_))));
    }
}
