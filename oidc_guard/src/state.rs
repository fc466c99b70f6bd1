//! The `state` parameter carried through the identity provider.
//!
//! A single redirect endpoint serves both sign-in and mid-session token
//! acquisition, so the envelope records which flow started the round trip,
//! where to send the user afterwards, and the session nonce.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::utils::{UtilError, base64url_decode, base64url_encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStage {
    SignIn,
    AcquireToken,
    /// Any stage this version does not recognize.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEnvelope {
    pub stage: AppStage,
    /// Where to send the user once the flow completes.
    pub path: String,
    pub nonce: String,
}

impl StateEnvelope {
    pub fn new(stage: AppStage, path: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            stage,
            path: path.into(),
            nonce: nonce.into(),
        }
    }

    pub fn encode(&self) -> Result<String, UtilError> {
        let json = serde_json::to_string(self).map_err(|e| UtilError::Format(e.to_string()))?;
        Ok(base64url_encode(json))
    }

    pub fn decode(state: &str) -> Result<Self, UtilError> {
        let bytes = base64url_decode(state)?;
        let json = String::from_utf8(bytes)
            .map_err(|_| UtilError::Format("State is not valid UTF-8".to_string()))?;
        serde_json::from_str(&json).map_err(|e| UtilError::Format(e.to_string()))
    }

    /// Constant-time comparison against the session nonce.
    pub fn nonce_matches(&self, session_nonce: Option<&str>) -> bool {
        match session_nonce {
            Some(expected) => bool::from(self.nonce.as_bytes().ct_eq(expected.as_bytes())),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let envelope = StateEnvelope::new(AppStage::AcquireToken, "/profile", "n-1");
        let encoded = envelope.encode().unwrap();

        assert!(!encoded.contains('='));
        assert_eq!(StateEnvelope::decode(&encoded).unwrap(), envelope);
    }

    #[test]
    fn test_stage_wire_names() {
        let encoded = StateEnvelope::new(AppStage::SignIn, "/", "n").encode().unwrap();
        let json = String::from_utf8(base64url_decode(&encoded).unwrap()).unwrap();
        assert!(json.contains(r#""stage":"sign_in""#));
    }

    #[test]
    fn test_unrecognized_stage_decodes_as_unknown() {
        let encoded = base64url_encode(r#"{"stage":"bogus","path":"/","nonce":"n"}"#);
        let envelope = StateEnvelope::decode(&encoded).unwrap();
        assert_eq!(envelope.stage, AppStage::Unknown);
    }

    #[test]
    fn test_decode_failures() {
        // Not base64url
        assert!(StateEnvelope::decode("%%%").is_err());
        // Not UTF-8
        assert!(StateEnvelope::decode(&base64url_encode([0xff, 0xfe])).is_err());
        // Not the envelope shape
        assert!(StateEnvelope::decode(&base64url_encode(r#"{"path":"/"}"#)).is_err());
    }

    #[test]
    fn test_nonce_matches() {
        let envelope = StateEnvelope::new(AppStage::SignIn, "/", "abc");
        assert!(envelope.nonce_matches(Some("abc")));
        assert!(!envelope.nonce_matches(Some("abd")));
        assert!(!envelope.nonce_matches(Some("ab")));
        assert!(!envelope.nonce_matches(None));
    }
}
