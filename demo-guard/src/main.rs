use axum::{Router, middleware::from_fn_with_state, routing::get};
use oidc_guard_axum::{
    AuthProvider, GuardSettings, ResourceState, acquire_token, acquire_token_on_behalf_of,
    oidc_guard_router, optional_authentication, require_access, require_authentication,
    require_bearer_token,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod handlers;

use crate::handlers::{
    admin, error, graph_profile, index, profile, todo_api, todolist, unauthorized,
};

fn settings_path() -> PathBuf {
    std::env::var("OIDC_GUARD_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("appsettings.json"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("{}=debug,oidc_guard=debug", env!("CARGO_CRATE_NAME")).into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = GuardSettings::from_file(settings_path())?;
    let provider = Arc::new(AuthProvider::from_settings(settings).await?);

    let signed_in = Router::new()
        .route("/profile", get(profile))
        .route_layer(from_fn_with_state(provider.clone(), require_authentication));

    let graph = Router::new()
        .route("/profile/graph", get(graph_profile))
        .route_layer(from_fn_with_state(
            ResourceState::new(provider.clone(), "graphAPI"),
            acquire_token,
        ));

    let matrix = Router::new()
        .route("/todolist", get(todolist))
        .route("/admin", get(admin))
        .route_layer(from_fn_with_state(provider.clone(), require_access));

    let api = Router::new()
        .route("/api/todolist", get(todo_api))
        .route_layer(from_fn_with_state(
            ResourceState::new(provider.clone(), "graphAPI"),
            acquire_token_on_behalf_of,
        ))
        .route_layer(from_fn_with_state(provider.clone(), require_bearer_token));

    let home = Router::new()
        .route("/", get(index))
        .route_layer(from_fn_with_state(provider.clone(), optional_authentication));

    let app = Router::new()
        .route("/unauthorized", get(unauthorized))
        .route("/error", get(error))
        .merge(home)
        .merge(signed_in)
        .merge(graph)
        .merge(matrix)
        .merge(api)
        .merge(oidc_guard_router(provider));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
