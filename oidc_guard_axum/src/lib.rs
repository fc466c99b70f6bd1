//! oidc_guard_axum - axum integration for oidc_guard
//!
//! Provides the `/signin`, `/signout` and redirect routes plus middleware
//! functions that protect application routes:
//!
//! ```no_run
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use oidc_guard_axum::{
//!     AuthAccount, AuthProvider, GuardSettings, ResourceAccessToken, ResourceState,
//!     acquire_token, oidc_guard_router, require_authentication,
//! };
//! use std::sync::Arc;
//!
//! async fn profile(AuthAccount(account): AuthAccount) -> String {
//!     account.username
//! }
//!
//! async fn graph(token: ResourceAccessToken) -> String {
//!     format!("token for {}", token.resource)
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = GuardSettings::from_file("appsettings.json")?;
//! let provider = Arc::new(AuthProvider::from_settings(settings).await?);
//!
//! let app: Router = Router::new()
//!     .route("/profile", get(profile))
//!     .route_layer(from_fn_with_state(provider.clone(), require_authentication))
//!     .merge(
//!         Router::new()
//!             .route("/graph", get(graph))
//!             .route_layer(from_fn_with_state(
//!                 ResourceState::new(provider.clone(), "graphAPI"),
//!                 acquire_token,
//!             )),
//!     )
//!     .merge(oidc_guard_router(provider));
//! # Ok(())
//! # }
//! ```

mod error;
mod handlers;
mod middleware;
mod router;
mod session;

pub use error::{IntoGuardRedirect, IntoResponseError};
pub use middleware::{
    ResourceState, acquire_token, acquire_token_on_behalf_of, optional_authentication,
    require_access, require_authentication, require_bearer_token,
};
pub use router::{oidc_guard_router, oidc_guard_router_no_trace};
pub use session::{AuthAccount, ResourceAccessToken};

// Re-export the core types an application needs to wire the routes
pub use oidc_guard::{Account, AuthProvider, GuardError, GuardSettings};
