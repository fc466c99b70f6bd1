//! Middleware functions for protecting application routes.
//!
//! All of them are meant for [`axum::middleware::from_fn_with_state`]. The session
//! middlewares take `Arc<AuthProvider>` as state, the token middlewares take a
//! [`ResourceState`] naming the downstream resource.

use axum::extract::{OriginalUri, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use http::{HeaderMap, StatusCode, Uri, header::WWW_AUTHENTICATE};
use oidc_guard::{AccessDecision, AuthProvider, TokenAcquisition};
use std::sync::Arc;

use super::error::{IntoResponseError, error_redirect, unauthorized_redirect};
use super::session::{AuthAccount, RequestSession, ResourceAccessToken};

/// State for [`acquire_token`] and [`acquire_token_on_behalf_of`].
#[derive(Clone)]
pub struct ResourceState {
    provider: Arc<AuthProvider>,
    resource: String,
}

impl ResourceState {
    pub fn new(provider: Arc<AuthProvider>, resource: impl Into<String>) -> Self {
        Self {
            provider,
            resource: resource.into(),
        }
    }
}

fn original_uri(req: &Request) -> Uri {
    req.extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.clone())
        .unwrap_or_else(|| req.uri().clone())
}

// Path as the client sent it, before any nesting stripped a prefix
fn request_path(req: &Request) -> String {
    original_uri(req).path().to_string()
}

fn request_target(req: &Request) -> String {
    let uri = original_uri(req);
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

fn bearer_challenge() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Bearer")],
        "Unauthorized",
    )
        .into_response()
}

/// Loads the caller's session, or produces the redirect that ends the request.
async fn authenticated_session(
    provider: &AuthProvider,
    headers: &HeaderMap,
    path: &str,
) -> Result<RequestSession, Response> {
    match RequestSession::load(provider, headers).await {
        Ok(Some(request_session)) if request_session.session.is_authenticated => {
            Ok(request_session)
        }
        Ok(_) => {
            tracing::debug!("Unauthenticated request to {}", path);
            Err(unauthorized_redirect(provider).into_response())
        }
        Err(e) => Err(error_redirect(provider, &e).into_response()),
    }
}

fn insert_account(req: &mut Request, request_session: &RequestSession) {
    if let Some(account) = &request_session.session.account {
        req.extensions_mut().insert(AuthAccount(account.clone()));
    }
}

/// Lets signed-in sessions through and redirects everyone else to the unauthorized route.
pub async fn require_authentication(
    State(provider): State<Arc<AuthProvider>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = request_path(&req);
    let request_session = match authenticated_session(&provider, req.headers(), &path).await {
        Ok(request_session) => request_session,
        Err(response) => return response,
    };

    insert_account(&mut req, &request_session);
    next.run(req).await
}

/// Adds [`AuthAccount`] for signed-in sessions and lets every request through.
pub async fn optional_authentication(
    State(provider): State<Arc<AuthProvider>>,
    mut req: Request,
    next: Next,
) -> Response {
    let loaded = RequestSession::load(&provider, req.headers()).await;
    match loaded {
        Ok(Some(request_session)) if request_session.session.is_authenticated => {
            insert_account(&mut req, &request_session);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Ignoring unreadable session: {}", e),
    }
    next.run(req).await
}

/// Enforces the access matrix entry for the requested path.
///
/// Routes without an entry only require a signed-in session. A groups overage is
/// resolved through the directory and the materialized groups are kept in the session.
pub async fn require_access(
    State(provider): State<Arc<AuthProvider>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = request_path(&req);
    let mut request_session = match authenticated_session(&provider, req.headers(), &path).await
    {
        Ok(request_session) => request_session,
        Err(response) => return response,
    };

    let method = req.method().clone();
    let before = request_session.session.clone();
    let decision = provider
        .check_access(&mut request_session.session, &method, &path)
        .await;

    if let AccessDecision::Deny(reason) = decision {
        tracing::warn!("Access to {} {} denied: {:?}", method, path, reason);
        return unauthorized_redirect(&provider).into_response();
    }

    if request_session.session != before {
        if let Err(e) = request_session
            .save(&provider, &mut HeaderMap::new())
            .await
        {
            return error_redirect(&provider, &e).into_response();
        }
    }

    insert_account(&mut req, &request_session);
    next.run(req).await
}

/// Validates the bearer token against the owned resource protecting the requested path.
pub async fn require_bearer_token(
    State(provider): State<Arc<AuthProvider>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        tracing::debug!("Missing bearer token");
        return bearer_challenge();
    };

    let path = request_path(&req);
    if !provider.is_token_valid(&token, &path).await {
        return bearer_challenge();
    }

    next.run(req).await
}

/// Makes a token for the configured resource available as [`ResourceAccessToken`].
///
/// When the user has to interact with the identity provider, the request is answered
/// with a redirect there and resumes at the same path once the redirect route completes.
pub async fn acquire_token(
    State(state): State<ResourceState>,
    mut req: Request,
    next: Next,
) -> Response {
    let provider = &state.provider;
    let path = request_path(&req);
    let mut request_session = match authenticated_session(provider, req.headers(), &path).await {
        Ok(request_session) => request_session,
        Err(response) => return response,
    };

    let target = request_target(&req);
    let acquisition = provider
        .acquire_token(&mut request_session.session, &state.resource, &target)
        .await;

    if let Err(e) = request_session.save(provider, &mut HeaderMap::new()).await {
        return error_redirect(provider, &e).into_response();
    }

    match acquisition {
        Ok(TokenAcquisition::Acquired(token)) => {
            insert_account(&mut req, &request_session);
            req.extensions_mut().insert(ResourceAccessToken {
                resource: state.resource.clone(),
                token,
            });
            next.run(req).await
        }
        Ok(TokenAcquisition::InteractionRequired { auth_url }) => {
            Redirect::to(&auth_url).into_response()
        }
        Err(e) => error_redirect(provider, &e).into_response(),
    }
}

/// Exchanges the caller's bearer token for one scoped to the configured resource.
///
/// Install after [`require_bearer_token`] so the incoming token is validated first.
pub async fn acquire_token_on_behalf_of(
    State(state): State<ResourceState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(assertion) = bearer_token(req.headers()) else {
        return bearer_challenge();
    };

    let token = match state
        .provider
        .acquire_token_on_behalf_of(&assertion, &state.resource)
        .await
        .into_response_error()
    {
        Ok(token) => token,
        Err(rejection) => return rejection.into_response(),
    };

    req.extensions_mut().insert(ResourceAccessToken {
        resource: state.resource.clone(),
        token,
    });
    next.run(req).await
}
