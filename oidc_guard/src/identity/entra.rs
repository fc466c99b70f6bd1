//! Confidential client for Microsoft Entra ID v2 endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;
use url::Url;

use crate::config::{GuardSettings, OIDC_DEFAULT_SCOPES, SESSION_MAX_AGE};
use crate::directory::http_client;
use crate::utils::base64url_decode;

use super::client::IdentityClient;
use super::errors::IdentityError;
use super::types::{
    Account, AuthCodeTokenRequest, AuthCodeUrlRequest, OboRequest, SilentRequest,
    TokenEndpointError, TokenEndpointResponse, TokenResponse,
};

/// Cached access tokens closer than this to expiry are refreshed.
const EXPIRY_SKEW_SECONDS: i64 = 300;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Token endpoint errors that can only be cleared by the user signing in again.
const INTERACTION_ERRORS: [&str; 4] = [
    "invalid_grant",
    "interaction_required",
    "consent_required",
    "login_required",
];

#[derive(Debug, Clone)]
struct CachedAccessToken {
    scopes: Vec<String>,
    token: String,
    expires_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct CachedAccount {
    refresh_token: Option<String>,
    access_tokens: Vec<CachedAccessToken>,
    last_used: DateTime<Utc>,
}

pub struct EntraClient {
    client_id: String,
    client_secret: String,
    authority: String,
    environment: String,
    http: reqwest::Client,
    cache: Mutex<HashMap<String, CachedAccount>>,
}

impl EntraClient {
    pub fn new(settings: &GuardSettings) -> Self {
        let environment = Url::parse(&settings.authority_host)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| settings.authority_host.clone());

        Self {
            client_id: settings.app_credentials.client_id.clone(),
            client_secret: settings.app_credentials.client_secret.clone(),
            authority: settings.authority(),
            environment,
            http: http_client(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    async fn post_token(
        &self,
        form: &[(&str, String)],
    ) -> Result<TokenEndpointResponse, IdentityError> {
        let response = self
            .http
            .post(self.token_endpoint())
            .form(form)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!("Token endpoint returned {}", status);
            return Err(classify_token_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }

    async fn remember(&self, account_id: &str, scopes: &[String], response: &TokenEndpointResponse) {
        let now = Utc::now();
        let mut cache = self.cache.lock().await;

        // Accounts idle for longer than a session can live have no session left to use them
        let idle_cutoff = now - Duration::seconds(*SESSION_MAX_AGE as i64);
        cache.retain(|_, entry| entry.last_used > idle_cutoff);

        let entry = cache.entry(account_id.to_string()).or_default();
        entry.last_used = now;

        if let Some(refresh_token) = &response.refresh_token {
            entry.refresh_token = Some(refresh_token.clone());
        }

        entry.access_tokens.retain(|cached| !same_scopes(&cached.scopes, scopes));
        entry.access_tokens.push(CachedAccessToken {
            scopes: scopes.to_vec(),
            token: response.access_token.clone(),
            expires_on: expires_on(response.expires_in),
        });
    }

    #[cfg(test)]
    async fn seed_cache(&self, account_id: &str, refresh_token: Option<&str>, tokens: Vec<CachedAccessToken>) {
        self.cache.lock().await.insert(
            account_id.to_string(),
            CachedAccount {
                refresh_token: refresh_token.map(str::to_string),
                access_tokens: tokens,
                last_used: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl IdentityClient for EntraClient {
    async fn get_authorization_url(
        &self,
        request: &AuthCodeUrlRequest,
    ) -> Result<String, IdentityError> {
        let request = AuthCodeUrlRequest {
            scopes: with_oidc_scopes(&request.scopes),
            ..request.clone()
        };
        build_authorization_url(&self.client_id, &request)
    }

    async fn exchange_code_for_tokens(
        &self,
        request: &AuthCodeTokenRequest,
    ) -> Result<TokenResponse, IdentityError> {
        let code = request
            .code
            .clone()
            .ok_or_else(|| IdentityError::InvalidRequest("Authorization code missing".to_string()))?;

        let response = self
            .post_token(&[
                ("client_id", self.client_id.clone()),
                ("client_secret", self.client_secret.clone()),
                ("grant_type", "authorization_code".to_string()),
                ("code", code),
                ("redirect_uri", request.redirect_uri.clone()),
                ("scope", with_oidc_scopes(&request.scopes).join(" ")),
                ("code_verifier", request.code_verifier.clone()),
            ])
            .await?;

        let account = match &response.id_token {
            Some(id_token) => Some(Account::from_claims(
                &self.environment,
                decode_claims(id_token)?,
            )),
            None => None,
        };

        if let Some(account) = &account {
            self.remember(&account.home_account_id, &request.scopes, &response)
                .await;
        }

        tracing::debug!("Authorization code redeemed");
        Ok(TokenResponse {
            access_token: response.access_token.clone(),
            id_token: response.id_token.clone(),
            account,
            scopes: granted_scopes(&response, &request.scopes),
            expires_on: Some(expires_on(response.expires_in)),
        })
    }

    async fn acquire_token_silently(
        &self,
        request: &SilentRequest,
    ) -> Result<TokenResponse, IdentityError> {
        let account_id = request.account.home_account_id.as_str();

        let refresh_token = {
            let mut cache = self.cache.lock().await;
            let Some(entry) = cache.get_mut(account_id) else {
                return Err(IdentityError::InteractionRequired(
                    "No cached credentials for account".to_string(),
                ));
            };
            entry.last_used = Utc::now();

            let fresh_after = Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS);
            if let Some(cached) = entry
                .access_tokens
                .iter()
                .find(|t| same_scopes(&t.scopes, &request.scopes) && t.expires_on > fresh_after)
            {
                tracing::debug!("Returning cached access token");
                return Ok(TokenResponse {
                    access_token: cached.token.clone(),
                    id_token: None,
                    account: Some(request.account.clone()),
                    scopes: cached.scopes.clone(),
                    expires_on: Some(cached.expires_on),
                });
            }

            entry.refresh_token.clone().ok_or_else(|| {
                IdentityError::InteractionRequired("No refresh token for account".to_string())
            })?
        };

        tracing::debug!("Refreshing access token for {} scopes", request.scopes.len());
        let response = self
            .post_token(&[
                ("client_id", self.client_id.clone()),
                ("client_secret", self.client_secret.clone()),
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token),
                ("scope", request.scopes.join(" ")),
            ])
            .await?;

        self.remember(account_id, &request.scopes, &response).await;

        Ok(TokenResponse {
            access_token: response.access_token.clone(),
            id_token: response.id_token.clone(),
            account: Some(request.account.clone()),
            scopes: granted_scopes(&response, &request.scopes),
            expires_on: Some(expires_on(response.expires_in)),
        })
    }

    async fn acquire_token_on_behalf_of(
        &self,
        request: &OboRequest,
    ) -> Result<TokenResponse, IdentityError> {
        let response = self
            .post_token(&[
                ("client_id", self.client_id.clone()),
                ("client_secret", self.client_secret.clone()),
                ("grant_type", JWT_BEARER_GRANT.to_string()),
                ("assertion", request.assertion.clone()),
                ("scope", request.scopes.join(" ")),
                ("requested_token_use", "on_behalf_of".to_string()),
            ])
            .await?;

        Ok(TokenResponse {
            access_token: response.access_token.clone(),
            id_token: None,
            account: None,
            scopes: granted_scopes(&response, &request.scopes),
            expires_on: Some(expires_on(response.expires_in)),
        })
    }

    async fn remove_account(&self, home_account_id: &str) {
        if self.cache.lock().await.remove(home_account_id).is_some() {
            tracing::debug!("Removed cached tokens for signed-out account");
        }
    }
}

/// `scopes` plus the OIDC defaults, so every code redemption also returns an ID
/// token and a refresh token for the cache.
fn with_oidc_scopes(scopes: &[String]) -> Vec<String> {
    let mut all = scopes.to_vec();
    for scope in OIDC_DEFAULT_SCOPES {
        if !all.iter().any(|s| s == scope) {
            all.push(scope.to_string());
        }
    }
    all
}

/// Authorization endpoint URL for `request`, using PKCE S256 and query response mode.
pub fn build_authorization_url(
    client_id: &str,
    request: &AuthCodeUrlRequest,
) -> Result<String, IdentityError> {
    let endpoint = format!("{}/oauth2/v2.0/authorize", request.authority);

    let mut params = vec![
        ("client_id", client_id.to_string()),
        ("response_type", "code".to_string()),
        ("response_mode", "query".to_string()),
        ("redirect_uri", request.redirect_uri.clone()),
        ("scope", request.scopes.join(" ")),
        ("state", request.state.clone()),
        ("code_challenge", request.code_challenge.clone()),
        ("code_challenge_method", "S256".to_string()),
    ];
    if let Some(login_hint) = &request.login_hint {
        params.push(("login_hint", login_hint.clone()));
    }
    if let Some(prompt) = &request.prompt {
        params.push(("prompt", prompt.clone()));
    }

    let url = Url::parse_with_params(&endpoint, &params)
        .map_err(|e| IdentityError::InvalidRequest(format!("{endpoint}: {e}")))?;
    Ok(url.to_string())
}

/// Payload of a JWT without signature verification. The validator checks signatures.
pub(crate) fn decode_claims(token: &str) -> Result<Map<String, Value>, IdentityError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| IdentityError::InvalidResponse("Malformed ID token".to_string()))?;
    let bytes = base64url_decode(payload)?;
    serde_json::from_slice(&bytes).map_err(|e| IdentityError::InvalidResponse(e.to_string()))
}

fn classify_token_error(status: u16, body: &str) -> IdentityError {
    match serde_json::from_str::<TokenEndpointError>(body) {
        Ok(err) if INTERACTION_ERRORS.contains(&err.error.as_str()) => {
            IdentityError::InteractionRequired(err.error_description.unwrap_or(err.error))
        }
        Ok(err) => IdentityError::Provider {
            error: err.error,
            description: err.error_description.unwrap_or_default(),
        },
        Err(_) => IdentityError::Request(format!("Token endpoint returned status {status}")),
    }
}

fn same_scopes(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|s| b.contains(s))
}

fn expires_on(expires_in: Option<i64>) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(expires_in.unwrap_or(3600))
}

fn granted_scopes(response: &TokenEndpointResponse, requested: &[String]) -> Vec<String> {
    response
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_else(|| requested.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_settings;
    use crate::utils::base64url_encode;
    use serde_json::json;

    fn url_request() -> AuthCodeUrlRequest {
        AuthCodeUrlRequest {
            authority: "https://login.microsoftonline.com/contoso.onmicrosoft.com".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            state: "abc".to_string(),
            redirect_uri: "http://localhost:3000/redirect".to_string(),
            code_challenge: "challenge".to_string(),
            login_hint: None,
            prompt: None,
        }
    }

    fn account() -> Account {
        Account {
            home_account_id: "oid.tid".to_string(),
            environment: "login.microsoftonline.com".to_string(),
            tenant_id: "tid".to_string(),
            username: "ada@contoso.com".to_string(),
            id_token_claims: Map::new(),
        }
    }

    #[test]
    fn test_build_authorization_url() {
        let url = build_authorization_url("client-1", &url_request()).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        assert_eq!(
            parsed.path(),
            "/contoso.onmicrosoft.com/oauth2/v2.0/authorize"
        );
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], "openid profile");
        assert_eq!(query["state"], "abc");
        assert_eq!(query["code_challenge_method"], "S256");
        assert!(!query.contains_key("login_hint"));
    }

    #[test]
    fn test_build_authorization_url_with_login_hint() {
        let request = AuthCodeUrlRequest {
            login_hint: Some("ada@contoso.com".to_string()),
            ..url_request()
        };
        let url = build_authorization_url("client-1", &request).unwrap();
        assert!(url.contains("login_hint=ada%40contoso.com"));
    }

    #[test]
    fn test_decode_claims() {
        let payload = base64url_encode(json!({ "oid": "o", "tid": "t" }).to_string());
        let token = format!("header.{payload}.signature");

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims["oid"], json!("o"));

        assert!(decode_claims("not-a-jwt").is_err());
    }

    #[test]
    fn test_classify_token_error() {
        let body = r#"{"error":"invalid_grant","error_description":"AADSTS50076: MFA required"}"#;
        assert!(matches!(
            classify_token_error(400, body),
            IdentityError::InteractionRequired(msg) if msg.contains("AADSTS50076")
        ));

        let body = r#"{"error":"invalid_client","error_description":"bad secret"}"#;
        assert!(matches!(
            classify_token_error(401, body),
            IdentityError::Provider { error, .. } if error == "invalid_client"
        ));

        assert!(matches!(
            classify_token_error(502, "<html>"),
            IdentityError::Request(_)
        ));
    }

    #[tokio::test]
    async fn test_silent_without_cache_requires_interaction() {
        let client = EntraClient::new(&sample_settings());
        let result = client
            .acquire_token_silently(&SilentRequest {
                account: account(),
                scopes: vec!["User.Read".to_string()],
            })
            .await;
        assert!(matches!(result, Err(IdentityError::InteractionRequired(_))));
    }

    #[tokio::test]
    async fn test_silent_returns_cached_token_for_same_scopes() {
        // Given a cached token for two scopes in a different order
        let client = EntraClient::new(&sample_settings());
        client
            .seed_cache(
                "oid.tid",
                None,
                vec![CachedAccessToken {
                    scopes: vec!["b".to_string(), "a".to_string()],
                    token: "cached-at".to_string(),
                    expires_on: Utc::now() + Duration::hours(1),
                }],
            )
            .await;

        // When acquiring silently
        let response = client
            .acquire_token_silently(&SilentRequest {
                account: account(),
                scopes: vec!["a".to_string(), "b".to_string()],
            })
            .await
            .unwrap();

        // Then the cached token is returned
        assert_eq!(response.access_token, "cached-at");
    }

    #[tokio::test]
    async fn test_silent_with_stale_token_and_no_refresh_token_requires_interaction() {
        let client = EntraClient::new(&sample_settings());
        client
            .seed_cache(
                "oid.tid",
                None,
                vec![CachedAccessToken {
                    scopes: vec!["a".to_string()],
                    token: "stale".to_string(),
                    expires_on: Utc::now() + Duration::seconds(10),
                }],
            )
            .await;

        let result = client
            .acquire_token_silently(&SilentRequest {
                account: account(),
                scopes: vec!["a".to_string()],
            })
            .await;
        assert!(matches!(result, Err(IdentityError::InteractionRequired(_))));
    }

    #[tokio::test]
    async fn test_exchange_without_code_is_rejected() {
        let client = EntraClient::new(&sample_settings());
        let result = client
            .exchange_code_for_tokens(&AuthCodeTokenRequest {
                authority: client.authority.clone(),
                scopes: vec!["openid".to_string()],
                redirect_uri: "http://localhost:3000/redirect".to_string(),
                code: None,
                code_verifier: "v".to_string(),
            })
            .await;
        assert!(matches!(result, Err(IdentityError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_authorization_url_always_asks_for_oidc_scopes() {
        let client = EntraClient::new(&sample_settings());
        let request = AuthCodeUrlRequest {
            scopes: vec!["Mail.Read".to_string()],
            ..url_request()
        };

        let url = client.get_authorization_url(&request).await.unwrap();
        let query: HashMap<String, String> =
            Url::parse(&url).unwrap().query_pairs().into_owned().collect();
        assert_eq!(query["scope"], "Mail.Read openid profile offline_access");
    }

    #[test]
    fn test_with_oidc_scopes_does_not_repeat_scopes() {
        let sign_in: Vec<String> = OIDC_DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        assert_eq!(with_oidc_scopes(&sign_in), sign_in);
    }

    #[tokio::test]
    async fn test_remove_account_evicts_cached_tokens() {
        // Given cached tokens for an account
        let client = EntraClient::new(&sample_settings());
        client
            .seed_cache(
                "oid.tid",
                Some("refresh"),
                vec![CachedAccessToken {
                    scopes: vec!["User.Read".to_string()],
                    token: "cached-at".to_string(),
                    expires_on: Utc::now() + Duration::hours(1),
                }],
            )
            .await;

        // When the account is removed
        client.remove_account("oid.tid").await;

        // Then silent acquisition needs the user again
        let result = client
            .acquire_token_silently(&SilentRequest {
                account: account(),
                scopes: vec!["User.Read".to_string()],
            })
            .await;
        assert!(matches!(result, Err(IdentityError::InteractionRequired(_))));
    }

    #[tokio::test]
    async fn test_idle_accounts_are_dropped_on_the_next_write() {
        let client = EntraClient::new(&sample_settings());
        client.seed_cache("idle", Some("old-refresh"), Vec::new()).await;
        client.seed_cache("active", Some("refresh"), Vec::new()).await;
        client.cache.lock().await.get_mut("idle").unwrap().last_used =
            Utc::now() - Duration::seconds(*SESSION_MAX_AGE as i64 + 60);

        let response = TokenEndpointResponse {
            access_token: "at".to_string(),
            id_token: None,
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        };
        client
            .remember("newcomer", &["User.Read".to_string()], &response)
            .await;

        let cache = client.cache.lock().await;
        assert!(!cache.contains_key("idle"));
        assert!(cache.contains_key("active"));
        assert!(cache.contains_key("newcomer"));
    }

    #[test]
    fn test_environment_is_authority_host() {
        let client = EntraClient::new(&sample_settings());
        assert_eq!(client.environment, "login.microsoftonline.com");
        assert!(client.token_endpoint().ends_with("/oauth2/v2.0/token"));
    }
}
