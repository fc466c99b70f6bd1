use axum::extract::{Query, State};
use axum::response::Redirect;
use http::HeaderMap;
use oidc_guard::{AuthProvider, RedirectOutcome, RedirectQuery, clear_session_cookie};
use std::sync::Arc;

use super::error::{IntoGuardRedirect, unauthorized_redirect};
use super::session::RequestSession;

pub(super) async fn signin(
    State(provider): State<Arc<AuthProvider>>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Redirect), Redirect> {
    let mut request_session = RequestSession::load_or_create(&provider, &headers)
        .await
        .into_guard_redirect(&provider)?;

    let auth_url = provider
        .sign_in(&mut request_session.session)
        .await
        .into_guard_redirect(&provider)?;

    let mut response_headers = HeaderMap::new();
    request_session
        .save(&provider, &mut response_headers)
        .await
        .into_guard_redirect(&provider)?;

    Ok((response_headers, Redirect::to(&auth_url)))
}

pub(super) async fn signout(
    State(provider): State<Arc<AuthProvider>>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Redirect), Redirect> {
    let logout_url = match RequestSession::load(&provider, &headers).await {
        Ok(Some(request_session)) => provider.sign_out(&request_session.id).await,
        Ok(None) => provider.logout_url(),
        Err(e) => Err(e),
    }
    .into_guard_redirect(&provider)?;

    let mut response_headers = HeaderMap::new();
    if let Err(e) = clear_session_cookie(&mut response_headers) {
        tracing::error!("Failed to clear session cookie: {}", e);
    }

    Ok((response_headers, Redirect::to(&logout_url)))
}

pub(super) async fn redirect(
    State(provider): State<Arc<AuthProvider>>,
    Query(query): Query<RedirectQuery>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Redirect), Redirect> {
    let Some(mut request_session) = RequestSession::load(&provider, &headers)
        .await
        .into_guard_redirect(&provider)?
    else {
        tracing::debug!("Redirect arrived without a session");
        return Ok((HeaderMap::new(), unauthorized_redirect(&provider)));
    };

    let outcome = provider
        .handle_redirect(&mut request_session.session, &query)
        .await
        .into_guard_redirect(&provider)?;

    if let RedirectOutcome::TokenAcquired { resource, .. } = &outcome {
        tracing::info!("Acquired token for {} interactively", resource);
    }

    let mut response_headers = HeaderMap::new();
    request_session
        .save(&provider, &mut response_headers)
        .await
        .into_guard_redirect(&provider)?;

    Ok((response_headers, Redirect::to(outcome.location())))
}
