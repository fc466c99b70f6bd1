use askama::Template;
use axum::{Json, http::StatusCode, response::Html};
use oidc_guard_axum::{AuthAccount, ResourceAccessToken};
use serde_json::{Value, json};

type HtmlResult = Result<Html<String>, (StatusCode, String)>;

#[derive(Template)]
#[template(path = "index.j2")]
struct IndexTemplate<'a> {
    username: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "profile.j2")]
struct ProfileTemplate<'a> {
    username: &'a str,
    claims: String,
}

#[derive(Template)]
#[template(path = "message.j2")]
struct MessageTemplate<'a> {
    title: &'a str,
    message: &'a str,
}

fn render(template: impl Template) -> HtmlResult {
    template
        .render()
        .map(Html)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub(crate) async fn index(account: Option<AuthAccount>) -> HtmlResult {
    let username = account.as_ref().map(|AuthAccount(a)| a.username.as_str());
    render(IndexTemplate { username })
}

pub(crate) async fn profile(AuthAccount(account): AuthAccount) -> HtmlResult {
    let claims = serde_json::to_string_pretty(&account.id_token_claims)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    render(ProfileTemplate {
        username: &account.username,
        claims,
    })
}

/// Calls Microsoft Graph with the token placed by `acquire_token`.
pub(crate) async fn graph_profile(token: ResourceAccessToken) -> HtmlResult {
    let me: Value = reqwest::Client::new()
        .get("https://graph.microsoft.com/v1.0/me")
        .bearer_auth(&token.token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?
        .json()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let claims = serde_json::to_string_pretty(&me)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let username = me
        .get("userPrincipalName")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    render(ProfileTemplate { username, claims })
}

pub(crate) async fn todolist(AuthAccount(account): AuthAccount) -> HtmlResult {
    let message = format!("{} is a member of the todo list group.", account.username);
    render(MessageTemplate {
        title: "Todo list",
        message: &message,
    })
}

pub(crate) async fn admin(AuthAccount(account): AuthAccount) -> HtmlResult {
    let message = format!("{} holds the TaskAdmin role.", account.username);
    render(MessageTemplate {
        title: "Admin",
        message: &message,
    })
}

pub(crate) async fn todo_api(token: ResourceAccessToken) -> Json<Value> {
    tracing::debug!("Serving todo list with a {} token", token.resource);
    Json(json!({ "todos": ["Write docs", "Ship it"], "downstream": token.resource }))
}

pub(crate) async fn unauthorized() -> HtmlResult {
    render(MessageTemplate {
        title: "Unauthorized",
        message: "You are not allowed to see this page.",
    })
}

pub(crate) async fn error() -> HtmlResult {
    render(MessageTemplate {
        title: "Error",
        message: "Something went wrong while talking to the identity provider.",
    })
}
