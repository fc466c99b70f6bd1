use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use ring::rand::SecureRandom;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Cookie error: {0}")]
    Cookie(String),

    #[error("Invalid format: {0}")]
    Format(String),
}

pub(crate) fn base64url_decode(input: &str) -> Result<Vec<u8>, UtilError> {
    URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|_| UtilError::Format("Failed to decode base64url".to_string()))
}

pub(crate) fn base64url_encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Random bytes of length `len`, base64url encoded.
pub fn gen_random_string(len: usize) -> Result<String, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| UtilError::Crypto("Failed to generate random string".to_string()))?;
    Ok(base64url_encode(buf))
}

/// S256 code challenge for a PKCE verifier.
pub(crate) fn pkce_challenge(verifier: &str) -> String {
    base64url_encode(Sha256::digest(verifier.as_bytes()))
}

/// Appends a `Set-Cookie` header. A negative `max_age` expires the cookie.
pub fn header_set_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<(), UtilError> {
    let cookie =
        format!("{name}={value}; SameSite=Lax; Secure; HttpOnly; Path=/; Max-Age={max_age}");
    let header_value: HeaderValue = cookie
        .parse()
        .map_err(|_| UtilError::Cookie("Failed to parse cookie".to_string()))?;
    headers.append(SET_COOKIE, header_value);
    Ok(())
}
