//! Signature and claim checks for ID tokens and incoming access tokens.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::config::GuardSettings;
use crate::directory::http_client;
use crate::utils::base64url_decode;

use super::errors::TokenValidationError;

const JWKS_CACHE_EXPIRATION_SECONDS: i64 = 600;
const LEEWAY_SECONDS: u64 = 60;

#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    /// `Ok(false)` when the token is well formed but its claims or signature do not check out.
    async fn validate_id_token(&self, id_token: &str) -> Result<bool, TokenValidationError>;

    /// Checks an incoming bearer token and that it carries every scope in `required_scopes`.
    async fn validate_access_token(
        &self,
        token: &str,
        required_scopes: &[String],
    ) -> Result<bool, TokenValidationError>;
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub k: Option<String>,
}

#[derive(Debug, Clone)]
struct JwksCache {
    jwks: Jwks,
    expires_at: DateTime<Utc>,
}

/// Validates tokens against the tenant's published signing keys.
pub struct JwksTokenValidator {
    client_id: String,
    tenant_id: String,
    authority_host: String,
    jwks_uri: String,
    http: reqwest::Client,
    cache: Mutex<Option<JwksCache>>,
}

impl JwksTokenValidator {
    pub fn new(settings: &GuardSettings) -> Self {
        Self {
            client_id: settings.app_credentials.client_id.clone(),
            tenant_id: settings.app_credentials.tenant_id.clone(),
            authority_host: settings.authority_host.trim_end_matches('/').to_string(),
            jwks_uri: format!("{}/discovery/v2.0/keys", settings.authority()),
            http: http_client(),
            cache: Mutex::new(None),
        }
    }

    /// Uses a fixed key set and never fetches.
    pub fn with_jwks(settings: &GuardSettings, jwks: Jwks) -> Self {
        let validator = Self::new(settings);
        Self {
            cache: Mutex::new(Some(JwksCache {
                jwks,
                expires_at: DateTime::<Utc>::MAX_UTC,
            })),
            ..validator
        }
    }

    async fn jwks(&self) -> Result<Jwks, TokenValidationError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.jwks.clone());
            }
            tracing::debug!("Cached JWKs expired");
        }

        let jwks: Jwks = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| TokenValidationError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| TokenValidationError::JwksFetch(e.to_string()))?;
        tracing::debug!("JWKs fetched from {}", self.jwks_uri);

        *cache = Some(JwksCache {
            jwks: jwks.clone(),
            expires_at: Utc::now() + Duration::seconds(JWKS_CACHE_EXPIRATION_SECONDS),
        });
        Ok(jwks)
    }

    /// Signature, expiry, audience and issuer. Returns the claims when they all hold.
    async fn verify(
        &self,
        token: &str,
        audiences: &[String],
    ) -> Result<Option<Map<String, Value>>, TokenValidationError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| TokenValidationError::InvalidTokenFormat)?;
        let kid = header
            .kid
            .ok_or_else(|| TokenValidationError::MissingKeyComponent("kid".to_string()))?;

        let jwks = self.jwks().await?;
        let jwk = find_jwk(&jwks, &kid).ok_or(TokenValidationError::NoMatchingKey)?;
        let key = convert_jwk_to_decoding_key(jwk, header.alg)?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = LEEWAY_SECONDS;
        validation.set_audience(audiences);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        let claims = match jsonwebtoken::decode::<Map<String, Value>>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::ExpiredSignature
                    | ErrorKind::ImmatureSignature
                    | ErrorKind::InvalidAudience
                    | ErrorKind::MissingRequiredClaim(_) => {
                        tracing::warn!("Token rejected: {}", e);
                        Ok(None)
                    }
                    _ => Err(e.into()),
                };
            }
        };

        if !issuer_matches(&self.authority_host, &self.tenant_id, &claims) {
            tracing::warn!("Token rejected: unexpected issuer {:?}", claims.get("iss"));
            return Ok(None);
        }

        Ok(Some(claims))
    }
}

#[async_trait]
impl TokenValidator for JwksTokenValidator {
    async fn validate_id_token(&self, id_token: &str) -> Result<bool, TokenValidationError> {
        let audiences = [self.client_id.clone()];
        Ok(self.verify(id_token, &audiences).await?.is_some())
    }

    async fn validate_access_token(
        &self,
        token: &str,
        required_scopes: &[String],
    ) -> Result<bool, TokenValidationError> {
        let audiences = [self.client_id.clone(), format!("api://{}", self.client_id)];
        let Some(claims) = self.verify(token, &audiences).await? else {
            return Ok(false);
        };

        if !has_scopes(&claims, required_scopes) {
            tracing::warn!("Access token lacks required scopes");
            return Ok(false);
        }
        Ok(true)
    }
}

fn find_jwk<'a>(jwks: &'a Jwks, kid: &str) -> Option<&'a Jwk> {
    jwks.keys.iter().find(|key| key.kid == kid)
}

fn convert_jwk_to_decoding_key(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, TokenValidationError> {
    match (jwk.kty.as_str(), alg) {
        ("RSA", Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) => {
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| TokenValidationError::MissingKeyComponent("n".to_string()))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| TokenValidationError::MissingKeyComponent("e".to_string()))?;
            Ok(DecodingKey::from_rsa_components(n, e)?)
        }
        ("oct", Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
            let k = jwk
                .k
                .as_deref()
                .ok_or_else(|| TokenValidationError::MissingKeyComponent("k".to_string()))?;
            let secret = base64url_decode(k)
                .map_err(|_| TokenValidationError::MissingKeyComponent("k".to_string()))?;
            Ok(DecodingKey::from_secret(&secret))
        }
        (kty, alg) => Err(TokenValidationError::UnsupportedAlgorithm(format!(
            "{alg:?} with {kty} key"
        ))),
    }
}

/// v2 issuers are `{host}/{tid}/v2.0`. Tenant aliases accept any tenant.
fn issuer_matches(authority_host: &str, tenant_id: &str, claims: &Map<String, Value>) -> bool {
    let Some(iss) = claims.get("iss").and_then(Value::as_str) else {
        return false;
    };
    let Some(tid) = claims.get("tid").and_then(Value::as_str) else {
        return false;
    };

    let tenant_is_guid = uuid::Uuid::parse_str(tenant_id).is_ok();
    if tenant_is_guid && !tid.eq_ignore_ascii_case(tenant_id) {
        return false;
    }

    iss == format!("{authority_host}/{tid}/v2.0")
}

/// Every required scope appears in the space-separated `scp` claim.
fn has_scopes(claims: &Map<String, Value>, required: &[String]) -> bool {
    let granted: Vec<&str> = claims
        .get("scp")
        .and_then(Value::as_str)
        .map(|s| s.split_whitespace().collect())
        .unwrap_or_default();

    required.iter().all(|scope| {
        // Required scopes may be configured fully qualified, e.g. api://id/access_as_user
        let short = scope.rsplit('/').next().unwrap_or(scope);
        granted.contains(&short)
    })
}
