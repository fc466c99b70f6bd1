//! Completion of every authorization-code round trip.
//!
//! The provider always returns to one redirect endpoint. The state envelope
//! tells which flow started the trip:
//!
//! - `SignIn`: redeem the code, validate the ID token, mark the session authenticated.
//! - `AcquireToken`: redeem the code for the resource recorded in the pending
//!   token request and send the user back to the route that needed it.
//!
//! Envelopes that are missing, undecodable or bound to another session are
//! rejected before the token endpoint is ever called.

use serde::Deserialize;

use crate::identity::AuthCodeTokenRequest;
use crate::session::{AuthSession, ResourceToken};
use crate::state::{AppStage, StateEnvelope};

use super::errors::GuardError;
use super::provider::AuthProvider;

/// Query parameters of the redirect request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectRejection {
    StateMissing,
    StateUndecodable,
    NonceMismatch,
    UnknownStage,
    IdTokenInvalid,
    UnknownResource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    SignedIn {
        location: String,
    },
    TokenAcquired {
        resource: String,
        location: String,
    },
    Rejected {
        reason: RedirectRejection,
        location: String,
    },
}

impl RedirectOutcome {
    /// Where the browser is sent next.
    pub fn location(&self) -> &str {
        match self {
            Self::SignedIn { location }
            | Self::TokenAcquired { location, .. }
            | Self::Rejected { location, .. } => location,
        }
    }
}

impl AuthProvider {
    pub async fn handle_redirect(
        &self,
        session: &mut AuthSession,
        query: &RedirectQuery,
    ) -> Result<RedirectOutcome, GuardError> {
        if let Some(error) = &query.error {
            tracing::warn!(
                "Identity provider returned error {}: {}",
                error,
                query.error_description.as_deref().unwrap_or_default()
            );
        }

        let Some(raw_state) = query.state.as_deref() else {
            return Ok(self.reject(RedirectRejection::StateMissing));
        };

        let envelope = match StateEnvelope::decode(raw_state) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("State decode failed: {}", e);
                return Ok(self.reject(RedirectRejection::StateUndecodable));
            }
        };

        if !envelope.nonce_matches(session.nonce.as_deref()) {
            return Ok(self.reject(RedirectRejection::NonceMismatch));
        }

        match envelope.stage {
            AppStage::SignIn => self.complete_sign_in(session, query).await,
            AppStage::AcquireToken => self.complete_acquire_token(session, query, &envelope).await,
            AppStage::Unknown => Ok(self.reject(RedirectRejection::UnknownStage)),
        }
    }

    async fn complete_sign_in(
        &self,
        session: &mut AuthSession,
        query: &RedirectQuery,
    ) -> Result<RedirectOutcome, GuardError> {
        let token_request = attach_code(session, query)?;

        let response = self
            .identity
            .exchange_code_for_tokens(token_request)
            .await
            .map_err(|e| GuardError::TokenExchange(e.to_string()).log())?;

        let id_token = response
            .id_token
            .as_deref()
            .ok_or_else(|| GuardError::TokenExchange("No ID token in response".to_string()).log())?;

        if !self.validator.validate_id_token(id_token).await? {
            return Ok(self.reject(RedirectRejection::IdTokenInvalid));
        }

        let account = response.account.ok_or_else(|| {
            GuardError::TokenExchange("No account in token response".to_string()).log()
        })?;

        tracing::info!("Signed in {}", account.username);
        session.account = Some(account);
        session.is_authenticated = true;

        Ok(RedirectOutcome::SignedIn {
            location: self.settings.auth_routes.post_login.clone(),
        })
    }

    async fn complete_acquire_token(
        &self,
        session: &mut AuthSession,
        query: &RedirectQuery,
        envelope: &StateEnvelope,
    ) -> Result<RedirectOutcome, GuardError> {
        let pending_scopes = session
            .token_request
            .as_ref()
            .map(|request| request.scopes.clone())
            .unwrap_or_default();

        let Some(resource_name) = self.resource_name_for_scopes(&pending_scopes) else {
            tracing::error!("No resource is configured for scopes {:?}", pending_scopes);
            return Ok(self.reject(RedirectRejection::UnknownResource));
        };

        let token_request = attach_code(session, query)?;
        let response = self
            .identity
            .exchange_code_for_tokens(token_request)
            .await
            .map_err(|e| GuardError::TokenExchange(e.to_string()).log())?;

        if response.access_token.is_empty() {
            return Err(GuardError::TokenExchange("Empty access token".to_string()).log());
        }

        tracing::debug!("Stored access token for resource {}", resource_name);
        session.remote_resources.insert(
            resource_name.clone(),
            ResourceToken {
                scopes: pending_scopes,
                access_token: Some(response.access_token),
                interactive: true,
            },
        );

        Ok(RedirectOutcome::TokenAcquired {
            resource: resource_name,
            location: self.local_path(&envelope.path),
        })
    }

    fn reject(&self, reason: RedirectRejection) -> RedirectOutcome {
        let routes = &self.settings.auth_routes;
        let location = match reason {
            RedirectRejection::UnknownStage | RedirectRejection::UnknownResource => {
                routes.error.clone()
            }
            _ => routes.unauthorized.clone(),
        };

        tracing::warn!("Redirect rejected: {:?}", reason);
        RedirectOutcome::Rejected { reason, location }
    }
}

/// Puts the returned code on the pending token request.
fn attach_code<'a>(
    session: &'a mut AuthSession,
    query: &RedirectQuery,
) -> Result<&'a AuthCodeTokenRequest, GuardError> {
    let code = query
        .code
        .clone()
        .ok_or_else(|| GuardError::TokenExchange("Authorization code missing".to_string()).log())?;

    let token_request = session.token_request.as_mut().ok_or_else(|| {
        GuardError::TokenExchange("No pending token request in session".to_string()).log()
    })?;
    token_request.code = Some(code);
    Ok(token_request)
}
