//! Request authentication
//!
//! Two independent checks guard the pipeline. Each one is active only when
//! its secret is configured:
//!
//! - a bearer token compared against the `Authorization` header
//! - an HMAC-SHA256 signature of the source URL, hex encoded in `X-Edge-HMAC`
//!
//! Both run before any network I/O, so unauthenticated callers can never use
//! the service as an open fetch proxy.

use crate::{
    config::AuthConfig,
    error::{CutoutError, Result},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the URL signature
pub const SIGNATURE_HEADER: &str = "x-edge-hmac";

const BEARER_PREFIX: &str = "Bearer ";

/// Validates credentials attached to a cutout request
#[derive(Clone)]
pub struct AuthGuard {
    bearer_token: Option<String>,
    hmac_secret: Option<Vec<u8>>,
}

impl AuthGuard {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            bearer_token: Some(config.bearer_token.clone()).filter(|t| !t.is_empty()),
            hmac_secret: Some(config.hmac_secret.as_bytes().to_vec()).filter(|s| !s.is_empty()),
        }
    }

    /// Guard with both checks disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            bearer_token: None,
            hmac_secret: None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.bearer_token.is_some() || self.hmac_secret.is_some()
    }

    /// Run every enabled check against the supplied headers
    ///
    /// # Errors
    /// - `Unauthorized` if the bearer token is missing or wrong
    /// - `Unauthorized` if the signature is missing, not hex, or does not match
    pub fn check(
        &self,
        authorization: Option<&str>,
        signature: Option<&str>,
        source_url: &str,
    ) -> Result<()> {
        if let Some(expected) = &self.bearer_token {
            let presented = authorization
                .and_then(|value| value.strip_prefix(BEARER_PREFIX))
                .ok_or_else(|| CutoutError::unauthorized("missing bearer token"))?;
            if presented != expected {
                return Err(CutoutError::unauthorized("invalid bearer token"));
            }
        }

        if let Some(secret) = &self.hmac_secret {
            let presented = signature
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| CutoutError::unauthorized("missing signature"))?;
            let presented = hex::decode(presented)
                .map_err(|_| CutoutError::unauthorized("malformed signature"))?;

            let mut mac = new_mac(secret)?;
            mac.update(source_url.as_bytes());
            // verify_slice compares in constant time
            mac.verify_slice(&presented)
                .map_err(|_| CutoutError::unauthorized("invalid signature"))?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("bearer", &self.bearer_token.is_some())
            .field("hmac", &self.hmac_secret.is_some())
            .finish()
    }
}

/// Lowercase hex HMAC-SHA256 of `source_url` under `secret`
///
/// This is what an upstream edge is expected to put in `X-Edge-HMAC`.
///
/// # Errors
/// - `Internal` if the MAC cannot be keyed (never for HMAC, which accepts any key length)
pub fn sign(secret: &str, source_url: &str) -> Result<String> {
    let mut mac = new_mac(secret.as_bytes())?;
    mac.update(source_url.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn new_mac(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret)
        .map_err(|e| CutoutError::internal(format!("failed to key HMAC: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const URL: &str = "https://images.example.com/person.jpg";

    fn guard(token: &str, secret: &str) -> AuthGuard {
        AuthGuard::from_config(&AuthConfig {
            bearer_token: token.to_string(),
            hmac_secret: secret.to_string(),
        })
    }

    fn mutate(value: &str) -> String {
        let mut chars: Vec<char> = value.chars().collect();
        if let Some(last) = chars.last_mut() {
            *last = if *last == 'a' { 'b' } else { 'a' };
        }
        chars.into_iter().collect()
    }

    #[test]
    fn test_disabled_guard_accepts_anything() {
        let guard = guard("", "");
        assert!(!guard.is_enabled());
        assert!(guard.check(None, None, URL).is_ok());
        assert!(AuthGuard::disabled().check(Some("junk"), Some("zz"), URL).is_ok());
    }

    #[test]
    fn test_known_signature() {
        let sig = sign("key", "The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_correct_credentials_pass() {
        let guard = guard("s3cret-token", "edge-secret");
        let sig = sign("edge-secret", URL).unwrap();
        assert!(guard
            .check(Some("Bearer s3cret-token"), Some(&sig), URL)
            .is_ok());
    }

    #[test]
    fn test_signature_is_case_and_whitespace_tolerant() {
        let guard = guard("", "edge-secret");
        let sig = format!("  {}\n", sign("edge-secret", URL).unwrap().to_uppercase());
        assert!(guard.check(None, Some(&sig), URL).is_ok());
    }

    #[test]
    fn test_mutated_token_fails() {
        let guard = guard("s3cret-token", "");
        let header = format!("Bearer {}", mutate("s3cret-token"));
        let err = guard.check(Some(&header), None, URL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_mutated_signature_fails() {
        let guard = guard("", "edge-secret");
        let sig = mutate(&sign("edge-secret", URL).unwrap());
        let err = guard.check(None, Some(&sig), URL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_signature_bound_to_url() {
        let guard = guard("", "edge-secret");
        let sig = sign("edge-secret", URL).unwrap();
        let err = guard
            .check(None, Some(&sig), "https://images.example.com/other.jpg")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_missing_headers_fail_when_enabled() {
        let guard = guard("tok", "edge-secret");
        assert!(guard.check(None, None, URL).is_err());
        assert!(guard.check(Some("tok"), None, URL).is_err());
        assert!(guard.check(Some("Bearer tok"), None, URL).is_err());
        assert!(guard.check(Some("Bearer tok"), Some("not-hex"), URL).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let rendered = format!("{:?}", guard("tok-value", "secret-value"));
        assert!(!rendered.contains("tok-value"));
        assert!(!rendered.contains("secret-value"));
    }
}
