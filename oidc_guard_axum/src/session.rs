use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use http::{HeaderMap, StatusCode, request::Parts};
use oidc_guard::{
    Account, AuthProvider, AuthSession, GuardError, SessionRepository,
    get_session_id_from_headers, new_session_id, set_session_cookie,
};

/// Session bound to the current request, plus whether it still needs a cookie.
pub(crate) struct RequestSession {
    pub(crate) id: String,
    pub(crate) session: AuthSession,
    is_new: bool,
}

impl RequestSession {
    /// Loads the session named by the request cookie, starting a fresh one if there is none.
    pub(crate) async fn load_or_create(
        provider: &AuthProvider,
        headers: &HeaderMap,
    ) -> Result<Self, GuardError> {
        if let Some(existing) = Self::load(provider, headers).await? {
            return Ok(existing);
        }

        tracing::debug!("Starting a new session");
        Ok(Self {
            id: new_session_id()?,
            session: AuthSession::default(),
            is_new: true,
        })
    }

    /// Loads the session named by the request cookie. `None` when there is no cookie or no stored session.
    pub(crate) async fn load(
        provider: &AuthProvider,
        headers: &HeaderMap,
    ) -> Result<Option<Self>, GuardError> {
        let Some(id) = get_session_id_from_headers(headers)? else {
            return Ok(None);
        };

        let Some(session) = provider.sessions().load(id).await? else {
            tracing::debug!("No stored session for cookie");
            return Ok(None);
        };

        Ok(Some(Self {
            id: id.to_string(),
            session,
            is_new: false,
        }))
    }

    /// Persists the session and adds the cookie to `headers` when the session is new.
    pub(crate) async fn save(
        &self,
        provider: &AuthProvider,
        headers: &mut HeaderMap,
    ) -> Result<(), GuardError> {
        provider.sessions().save(&self.id, &self.session).await?;
        if self.is_new {
            set_session_cookie(headers, &self.id)?;
        }
        Ok(())
    }
}

/// Signed-in account, placed in request extensions by the session middlewares.
///
/// ```no_run
/// use oidc_guard_axum::AuthAccount;
///
/// async fn profile(AuthAccount(account): AuthAccount) -> String {
///     format!("Hello, {}", account.username)
/// }
/// ```
#[derive(Clone, Debug)]
pub struct AuthAccount(pub Account);

impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthAccount>().cloned().ok_or_else(|| {
            tracing::warn!("AuthAccount requested on a route without a session middleware");
            (StatusCode::UNAUTHORIZED, "Unauthorized")
        })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthAccount>().cloned())
    }
}

/// Access token for a downstream resource, placed by `acquire_token` or `acquire_token_on_behalf_of`.
#[derive(Clone, Debug)]
pub struct ResourceAccessToken {
    pub resource: String,
    pub token: String,
}

impl<S> FromRequestParts<S> for ResourceAccessToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResourceAccessToken>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!("No resource token on request; is a token middleware installed?");
                (StatusCode::INTERNAL_SERVER_ERROR, "Missing resource token")
            })
    }
}
