//! Identity Verification
//!
//! The hub consumes a single capability: resolve a raw bearer token to a
//! user identity or reject it. How tokens are minted is someone else's
//! problem; the shipped verifier only checks an HMAC-SHA256 signature over
//! the token payload with constant-time comparison.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Resolves bearer tokens to user identities.
///
/// Implementations never learn anything else about the connection; the hub
/// never inspects token structure itself.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityVerifier: Send + Sync {
    /// Verify a raw bearer token, returning the authenticated user id.
    fn verify(&self, token: &str) -> Result<String>;
}

/// Claims carried inside a signed token payload
#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(rename = "userId")]
    user_id: String,
}

/// Verifies `base64url(payload).base64url(signature)` bearer tokens signed
/// with HMAC-SHA256 over a shared server secret. The payload is a JSON
/// object carrying the user id.
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
}

impl HmacTokenVerifier {
    /// Create a verifier over the given signing secret
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl IdentityVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> Result<String> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::AuthFailure("missing token".to_string()));
        }

        let (payload_b64, sig_b64) = token
            .split_once('.')
            .ok_or_else(|| Error::AuthFailure("malformed token".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::AuthFailure("malformed token payload".to_string()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| Error::AuthFailure("malformed token signature".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::AuthFailure(format!("verifier misconfigured: {e}")))?;
        mac.update(&payload);
        let expected = mac.finalize().into_bytes();

        let signatures_match: bool = expected.as_slice().ct_eq(&signature).into();
        if !signatures_match {
            warn!("token signature rejected");
            return Err(Error::AuthFailure("invalid token".to_string()));
        }

        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| Error::AuthFailure("token payload missing user id".to_string()))?;

        if claims.user_id.trim().is_empty() {
            return Err(Error::AuthFailure("token payload missing user id".to_string()));
        }

        Ok(claims.user_id)
    }
}
