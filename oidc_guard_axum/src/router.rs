//! Router for the sign-in, sign-out and redirect endpoints

use axum::Router;
use axum::routing::get;
use oidc_guard::AuthProvider;
use std::sync::Arc;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers::{redirect, signin, signout};

/// Create a router serving `/signin`, `/signout` and the configured redirect path
///
/// The redirect route is mounted at the path component of `authRoutes.redirect`,
/// so the router must be merged at the application root rather than nested.
pub fn oidc_guard_router(provider: Arc<AuthProvider>) -> Router {
    oidc_guard_router_no_trace(provider).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            ),
    )
}

/// Same as [`oidc_guard_router`] without the HTTP tracing layer.
pub fn oidc_guard_router_no_trace(provider: Arc<AuthProvider>) -> Router {
    let redirect_path = provider.settings().redirect_path();
    Router::new()
        .route("/signin", get(signin))
        .route("/signout", get(signout))
        .route(&redirect_path, get(redirect))
        .with_state(provider)
}
