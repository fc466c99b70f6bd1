use http::header::{COOKIE, HeaderMap};

use crate::config::{SESSION_COOKIE_NAME, SESSION_MAX_AGE};
use crate::utils::{gen_random_string, header_set_cookie};

use super::errors::SessionError;

pub fn new_session_id() -> Result<String, SessionError> {
    Ok(gen_random_string(32)?)
}

/// Adds the session cookie for `session_id` to `headers`.
pub fn set_session_cookie(headers: &mut HeaderMap, session_id: &str) -> Result<(), SessionError> {
    header_set_cookie(
        headers,
        SESSION_COOKIE_NAME.as_str(),
        session_id,
        *SESSION_MAX_AGE as i64,
    )?;
    Ok(())
}

/// Adds an already-expired session cookie to `headers`.
pub fn clear_session_cookie(headers: &mut HeaderMap) -> Result<(), SessionError> {
    header_set_cookie(headers, SESSION_COOKIE_NAME.as_str(), "value", -86400)?;
    Ok(())
}

pub fn get_session_id_from_headers(headers: &HeaderMap) -> Result<Option<&str>, SessionError> {
    let Some(cookie_header) = headers.get(COOKIE) else {
        tracing::debug!("No cookie header found");
        return Ok(None);
    };

    let cookie_str = cookie_header.to_str().map_err(|e| {
        tracing::error!("Invalid cookie header: {}", e);
        SessionError::Cookie("Invalid cookie header".to_string())
    })?;

    let cookie_name = SESSION_COOKIE_NAME.as_str();
    let session_id = cookie_str.split(';').map(|s| s.trim()).find_map(|s| {
        let mut parts = s.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(k), Some(v)) if k == cookie_name && !v.is_empty() => Some(v),
            _ => None,
        }
    });

    if session_id.is_none() {
        tracing::debug!("No session cookie '{}' found in cookies", cookie_name);
    }

    Ok(session_id)
}
