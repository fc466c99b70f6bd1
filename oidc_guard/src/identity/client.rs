use async_trait::async_trait;

use super::errors::IdentityError;
use super::types::{
    AuthCodeTokenRequest, AuthCodeUrlRequest, OboRequest, SilentRequest, TokenResponse,
};

/// Confidential client operations against the identity provider.
#[async_trait]
pub trait IdentityClient: Send + Sync + 'static {
    /// Builds the URL the browser is sent to for interactive sign-in.
    async fn get_authorization_url(
        &self,
        request: &AuthCodeUrlRequest,
    ) -> Result<String, IdentityError>;

    /// Redeems an authorization code.
    async fn exchange_code_for_tokens(
        &self,
        request: &AuthCodeTokenRequest,
    ) -> Result<TokenResponse, IdentityError>;

    /// Returns a token from cache or via refresh. Fails with
    /// [`IdentityError::InteractionRequired`] when the user has to sign in again.
    async fn acquire_token_silently(
        &self,
        request: &SilentRequest,
    ) -> Result<TokenResponse, IdentityError>;

    async fn acquire_token_on_behalf_of(
        &self,
        request: &OboRequest,
    ) -> Result<TokenResponse, IdentityError>;

    /// Forgets every token held for the account, e.g. on sign-out.
    async fn remove_account(&self, home_account_id: &str);
}
