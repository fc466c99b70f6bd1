//! Mock collaborators and sample configuration for tests.
//!
//! Compiled for this crate's own tests and, behind the `test-utils` feature,
//! for downstream crates that want to drive an [`AuthProvider`] without a
//! live identity provider.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

use crate::access::AccessRule;
use crate::config::{AppCredentials, AuthRoutes, DirectorySettings, GuardSettings};
use crate::coordination::{AuthProvider, GuardError, RedirectQuery};
use crate::directory::{DirectoryFetcher, FetchError};
use crate::identity::{
    Account, AuthCodeTokenRequest, AuthCodeUrlRequest, IdentityClient, IdentityError, OboRequest,
    SilentRequest, TokenResponse, TokenValidationError, TokenValidator, build_authorization_url,
};
use crate::resources::ResourceConfig;
use crate::session::CacheSessionRepository;
use crate::storage::InMemoryCacheStore;

pub const SAMPLE_CLIENT_ID: &str = "00000000-0000-0000-0000-000000000001";
pub const SAMPLE_TENANT_ID: &str = "00000000-0000-0000-0000-0000000000aa";
pub const MEMBER_OF_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me/memberOf";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Settings with two remote resources (`graphAPI`, `mailAPI`), one owned API
/// protecting `/api/todolist`, a group rule on `/todolist` and a role rule on `/admin`.
pub fn sample_settings() -> GuardSettings {
    let remote_resources = HashMap::from([
        (
            "graphAPI".to_string(),
            ResourceConfig {
                endpoint: "https://graph.microsoft.com/v1.0/me".to_string(),
                scopes: strings(&["User.Read"]),
                path: None,
            },
        ),
        (
            "mailAPI".to_string(),
            ResourceConfig {
                endpoint: "https://graph.microsoft.com/v1.0/me/messages".to_string(),
                scopes: strings(&["Mail.Read"]),
                path: None,
            },
        ),
    ]);

    let owned_resources = HashMap::from([(
        "todoApi".to_string(),
        ResourceConfig {
            endpoint: "http://localhost:3000/api/todolist".to_string(),
            scopes: vec![format!("api://{SAMPLE_CLIENT_ID}/access_as_user")],
            path: Some("/api/todolist".to_string()),
        },
    )]);

    let access_matrix = HashMap::from([
        (
            "todolist".to_string(),
            AccessRule {
                path: "/todolist".to_string(),
                methods: strings(&["GET", "POST"]),
                groups: Some(strings(&["group-todo-read"])),
                roles: None,
            },
        ),
        (
            "admin".to_string(),
            AccessRule {
                path: "/admin".to_string(),
                methods: strings(&["GET", "POST"]),
                groups: None,
                roles: Some(strings(&["TaskAdmin"])),
            },
        ),
    ]);

    GuardSettings {
        app_credentials: AppCredentials {
            client_id: SAMPLE_CLIENT_ID.to_string(),
            tenant_id: SAMPLE_TENANT_ID.to_string(),
            client_secret: "test-secret".to_string(),
        },
        auth_routes: AuthRoutes {
            redirect: "http://localhost:3000/redirect".to_string(),
            error: "/error".to_string(),
            unauthorized: "/unauthorized".to_string(),
            post_login: "/".to_string(),
            post_logout: "/".to_string(),
        },
        authority_host: "https://login.microsoftonline.com".to_string(),
        remote_resources,
        owned_resources,
        access_matrix,
        directory: DirectorySettings {
            member_of_endpoint: MEMBER_OF_ENDPOINT.to_string(),
            ..Default::default()
        },
    }
}

pub fn sample_account() -> Account {
    let claims: Map<String, Value> = json!({
        "oid": "00000000-0000-0000-0000-0000000000cc",
        "tid": SAMPLE_TENANT_ID,
        "preferred_username": "ada@contoso.com",
        "name": "Ada Lovelace",
    })
    .as_object()
    .cloned()
    .unwrap_or_default();
    Account::from_claims("login.microsoftonline.com", claims)
}

/// Redirect query the provider would send back for an authorization URL built by the mock client.
pub fn redirect_query_for(auth_url: &str, code: &str) -> RedirectQuery {
    let state = Url::parse(auth_url).ok().and_then(|url| {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
    });
    RedirectQuery {
        state,
        code: Some(code.to_string()),
        ..Default::default()
    }
}

struct IdentityBehavior {
    silent: Result<String, IdentityError>,
    exchange: Result<String, IdentityError>,
    obo: Result<String, IdentityError>,
    account: Account,
    exchanged_codes: Vec<String>,
    silent_scopes: Vec<Vec<String>>,
    obo_assertions: Vec<String>,
    removed_accounts: Vec<String>,
}

/// Identity client with scripted responses that records what it was asked.
///
/// Silent acquisition requires interaction until [`Self::set_silent_token`] is called.
pub struct MockIdentityClient {
    behavior: Mutex<IdentityBehavior>,
}

impl MockIdentityClient {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(IdentityBehavior {
                silent: Err(IdentityError::InteractionRequired(
                    "No cached credentials".to_string(),
                )),
                exchange: Ok("access-token".to_string()),
                obo: Ok("obo-token".to_string()),
                account: sample_account(),
                exchanged_codes: Vec::new(),
                silent_scopes: Vec::new(),
                obo_assertions: Vec::new(),
                removed_accounts: Vec::new(),
            }),
        }
    }

    pub fn set_silent_token(&self, token: &str) {
        lock(&self.behavior).silent = Ok(token.to_string());
    }

    pub fn fail_silent(&self, error: IdentityError) {
        lock(&self.behavior).silent = Err(error);
    }

    pub fn set_exchange_access_token(&self, token: &str) {
        lock(&self.behavior).exchange = Ok(token.to_string());
    }

    pub fn fail_exchange(&self, error: IdentityError) {
        lock(&self.behavior).exchange = Err(error);
    }

    /// Account returned by later code exchanges.
    pub fn set_account(&self, account: Account) {
        lock(&self.behavior).account = account;
    }

    pub fn set_obo_token(&self, token: &str) {
        lock(&self.behavior).obo = Ok(token.to_string());
    }

    pub fn fail_obo(&self, error: IdentityError) {
        lock(&self.behavior).obo = Err(error);
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        lock(&self.behavior).exchanged_codes.clone()
    }

    pub fn silent_scopes(&self) -> Vec<Vec<String>> {
        lock(&self.behavior).silent_scopes.clone()
    }

    pub fn obo_assertions(&self) -> Vec<String> {
        lock(&self.behavior).obo_assertions.clone()
    }

    pub fn removed_accounts(&self) -> Vec<String> {
        lock(&self.behavior).removed_accounts.clone()
    }
}

impl Default for MockIdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for MockIdentityClient {
    async fn get_authorization_url(
        &self,
        request: &AuthCodeUrlRequest,
    ) -> Result<String, IdentityError> {
        build_authorization_url(SAMPLE_CLIENT_ID, request)
    }

    async fn exchange_code_for_tokens(
        &self,
        request: &AuthCodeTokenRequest,
    ) -> Result<TokenResponse, IdentityError> {
        let mut behavior = lock(&self.behavior);
        if let Some(code) = &request.code {
            behavior.exchanged_codes.push(code.clone());
        }
        let access_token = behavior.exchange.clone()?;

        Ok(TokenResponse {
            access_token,
            id_token: Some("mock-id-token".to_string()),
            account: Some(behavior.account.clone()),
            scopes: request.scopes.clone(),
            expires_on: None,
        })
    }

    async fn acquire_token_silently(
        &self,
        request: &SilentRequest,
    ) -> Result<TokenResponse, IdentityError> {
        let mut behavior = lock(&self.behavior);
        behavior.silent_scopes.push(request.scopes.clone());
        let access_token = behavior.silent.clone()?;

        Ok(TokenResponse {
            access_token,
            account: Some(request.account.clone()),
            scopes: request.scopes.clone(),
            ..Default::default()
        })
    }

    async fn acquire_token_on_behalf_of(
        &self,
        request: &OboRequest,
    ) -> Result<TokenResponse, IdentityError> {
        let mut behavior = lock(&self.behavior);
        behavior.obo_assertions.push(request.assertion.clone());
        let access_token = behavior.obo.clone()?;

        Ok(TokenResponse {
            access_token,
            scopes: request.scopes.clone(),
            ..Default::default()
        })
    }

    async fn remove_account(&self, home_account_id: &str) {
        lock(&self.behavior)
            .removed_accounts
            .push(home_account_id.to_string());
    }
}

struct ValidatorBehavior {
    id_token: Result<bool, TokenValidationError>,
    access_token: bool,
    access_token_scopes: Vec<Vec<String>>,
}

/// Token validator that accepts everything until told otherwise.
pub struct MockValidator {
    behavior: Mutex<ValidatorBehavior>,
}

impl MockValidator {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(ValidatorBehavior {
                id_token: Ok(true),
                access_token: true,
                access_token_scopes: Vec::new(),
            }),
        }
    }

    pub fn set_id_token_valid(&self, valid: bool) {
        lock(&self.behavior).id_token = Ok(valid);
    }

    pub fn fail_id_token_validation(&self) {
        lock(&self.behavior).id_token = Err(TokenValidationError::JwksFetch(
            "Key endpoint unreachable".to_string(),
        ));
    }

    pub fn set_access_token_valid(&self, valid: bool) {
        lock(&self.behavior).access_token = valid;
    }

    pub fn access_token_scopes(&self) -> Vec<Vec<String>> {
        lock(&self.behavior).access_token_scopes.clone()
    }
}

impl Default for MockValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenValidator for MockValidator {
    async fn validate_id_token(&self, _id_token: &str) -> Result<bool, TokenValidationError> {
        lock(&self.behavior).id_token.clone()
    }

    async fn validate_access_token(
        &self,
        _token: &str,
        required_scopes: &[String],
    ) -> Result<bool, TokenValidationError> {
        let mut behavior = lock(&self.behavior);
        behavior.access_token_scopes.push(required_scopes.to_vec());
        Ok(behavior.access_token)
    }
}

/// Directory fetcher serving fixed pages by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, Value>,
    requests: Mutex<Vec<(String, String)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: Value) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn requested_urls(&self) -> Vec<String> {
        lock(&self.requests).iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn bearer_tokens(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }
}

#[async_trait]
impl DirectoryFetcher for MockFetcher {
    async fn fetch(&self, url: &str, bearer_token: &str) -> Result<Value, FetchError> {
        lock(&self.requests).push((url.to_string(), bearer_token.to_string()));
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}

/// An [`AuthProvider`] wired to mocks, with handles to each mock.
pub struct TestHarness {
    pub provider: AuthProvider,
    pub identity: Arc<MockIdentityClient>,
    pub validator: Arc<MockValidator>,
    pub fetcher: Arc<MockFetcher>,
    pub sessions: Arc<CacheSessionRepository>,
}

pub fn test_provider(settings: GuardSettings) -> Result<TestHarness, GuardError> {
    test_provider_with(settings, MockFetcher::new())
}

pub fn test_provider_with(
    settings: GuardSettings,
    fetcher: MockFetcher,
) -> Result<TestHarness, GuardError> {
    let identity = Arc::new(MockIdentityClient::new());
    let validator = Arc::new(MockValidator::new());
    let fetcher = Arc::new(fetcher);
    let sessions = Arc::new(CacheSessionRepository::with_ttl(
        Box::new(InMemoryCacheStore::new()),
        3600,
    ));

    let provider = AuthProvider::new(
        settings,
        identity.clone(),
        validator.clone(),
        fetcher.clone(),
        sessions.clone(),
    )?;

    Ok(TestHarness {
        provider,
        identity,
        validator,
        fetcher,
        sessions,
    })
}
