use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Signed-in principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// `{oid}.{tid}`, stable across sessions.
    pub home_account_id: String,
    pub environment: String,
    pub tenant_id: String,
    pub username: String,
    pub id_token_claims: Map<String, Value>,
}

impl Account {
    /// Builds an account from decoded ID token claims.
    pub fn from_claims(environment: &str, claims: Map<String, Value>) -> Self {
        let claim = |name: &str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let oid = claim("oid");
        let tid = claim("tid");
        let sub = claim("sub");
        let home_account_id = if oid.is_empty() {
            format!("{sub}.{tid}")
        } else {
            format!("{oid}.{tid}")
        };

        Self {
            home_account_id,
            environment: environment.to_string(),
            tenant_id: tid,
            username: claim("preferred_username"),
            id_token_claims: claims,
        }
    }
}

/// Parameters of the authorization redirect, kept in the session between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCodeUrlRequest {
    pub authority: String,
    pub scopes: Vec<String>,
    pub state: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub login_hint: Option<String>,
    pub prompt: Option<String>,
}

/// Parameters of the code redemption that follows an authorization redirect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCodeTokenRequest {
    pub authority: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub code: Option<String>,
    pub code_verifier: String,
}

#[derive(Debug, Clone)]
pub struct SilentRequest {
    pub account: Account,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OboRequest {
    /// Access token presented by the caller.
    pub assertion: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: Option<String>,
    pub account: Option<Account>,
    pub scopes: Vec<String>,
    pub expires_on: Option<DateTime<Utc>>,
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenEndpointResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) id_token: Option<String>,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<i64>,
    #[serde(default)]
    pub(crate) scope: Option<String>,
}

/// Token endpoint error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenEndpointError {
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_from_claims() {
        let claims = json!({
            "oid": "00000000-0000-0000-0000-0000000000aa",
            "tid": "00000000-0000-0000-0000-0000000000bb",
            "sub": "subject",
            "preferred_username": "ada@contoso.com",
        })
        .as_object()
        .cloned()
        .unwrap();

        let account = Account::from_claims("login.microsoftonline.com", claims.clone());

        assert_eq!(
            account.home_account_id,
            "00000000-0000-0000-0000-0000000000aa.00000000-0000-0000-0000-0000000000bb"
        );
        assert_eq!(account.tenant_id, "00000000-0000-0000-0000-0000000000bb");
        assert_eq!(account.username, "ada@contoso.com");
        assert_eq!(account.environment, "login.microsoftonline.com");
        assert_eq!(account.id_token_claims, claims);
    }

    #[test]
    fn test_account_from_claims_without_oid_uses_sub() {
        let claims = json!({ "sub": "s1", "tid": "t1" }).as_object().cloned().unwrap();
        let account = Account::from_claims("env", claims);
        assert_eq!(account.home_account_id, "s1.t1");
        assert_eq!(account.username, "");
    }

    #[test]
    fn test_token_endpoint_response_optional_fields() {
        let body = r#"{"access_token":"at","token_type":"Bearer"}"#;
        let parsed: TokenEndpointResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "at");
        assert!(parsed.id_token.is_none());
        assert!(parsed.refresh_token.is_none());
    }
}
