//! Authorization-request state tokens
//!
//! The `state` parameter round-tripped through the OAuth redirect is a signed
//! claim set: tenant, integration, acting user, issue time, and a random
//! nonce. HMAC-SHA256 with constant-time comparison makes the token
//! tamper-evident without any server-side session row; verification is a pure
//! function over the token bytes and a caller-supplied clock.
//!
//! Wire format: `base64url(json payload) + "." + hex(hmac_sha256(payload))`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoKey;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted token age. An age of exactly this many seconds still
/// verifies; one millisecond more does not.
pub const STATE_TTL_SECONDS: i64 = 600;

/// Nonce length issued by this codec. Inbound tokens are held to
/// `MIN_NONCE_LEN`, the floor older issuers used.
pub const NONCE_LEN: usize = 24;
const MIN_NONCE_LEN: usize = 16;

/// State token errors
#[derive(Debug, Error)]
pub enum StateTokenError {
    #[error("state token failed integrity or format checks")]
    Invalid,
    #[error("state token expired: {age_ms}ms old")]
    Expired { age_ms: i64 },
    #[error("state token encoding failed: {0}")]
    Encoding(String),
}

/// Claims bound into the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateToken {
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

impl StateToken {
    /// Age of this token relative to `now`. Negative when `issued_at` is in
    /// the future.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.issued_at).num_milliseconds()
    }
}

/// Issues and verifies signed state tokens with a dedicated key.
///
/// The signing key is separate from the vault key so a leak of one does not
/// compromise the other.
#[derive(Debug, Clone)]
pub struct StateTokenCodec {
    key: CryptoKey,
}

impl StateTokenCodec {
    pub fn new(key: CryptoKey) -> Self {
        Self { key }
    }

    /// Build and sign a fresh token for an authorization request.
    pub fn issue(
        &self,
        tenant_id: Uuid,
        integration_id: Uuid,
        user_id: Uuid,
        redirect_uri: Option<String>,
    ) -> Result<String, StateTokenError> {
        let token = StateToken {
            tenant_id,
            integration_id,
            user_id,
            issued_at: Utc::now(),
            nonce: generate_nonce(),
            redirect_uri,
        };
        self.encode(&token)
    }

    /// Sign an already-constructed token. Split out from [`issue`] so callers
    /// controlling `issued_at` or the nonce (replay drills, clock tests) go
    /// through the same signing path.
    ///
    /// [`issue`]: StateTokenCodec::issue
    pub fn encode(&self, token: &StateToken) -> Result<String, StateTokenError> {
        let payload = serde_json::to_vec(token)
            .map_err(|e| StateTokenError::Encoding(format!("serialization: {}", e)))?;
        let signature = self.sign(&payload)?;
        Ok(format!(
            "{}.{}",
            base64_url::encode(&payload),
            hex::encode(signature)
        ))
    }

    /// Decode and check a presented token against `now`.
    ///
    /// The MAC is recomputed and compared in constant time before the payload
    /// is parsed; any structural defect maps to [`StateTokenError::Invalid`]
    /// so callers cannot distinguish forgery modes.
    pub fn verify(&self, raw: &str, now: DateTime<Utc>) -> Result<StateToken, StateTokenError> {
        let (payload_b64, signature_hex) = raw.split_once('.').ok_or(StateTokenError::Invalid)?;

        let payload = base64_url::decode(payload_b64).map_err(|_| StateTokenError::Invalid)?;
        let provided = hex::decode(signature_hex).map_err(|_| StateTokenError::Invalid)?;
        let expected = self.sign(&payload)?;

        let signature_matches: bool =
            subtle::ConstantTimeEq::ct_eq(expected.as_slice(), provided.as_slice()).into();
        if !signature_matches {
            return Err(StateTokenError::Invalid);
        }

        let token: StateToken =
            serde_json::from_slice(&payload).map_err(|_| StateTokenError::Invalid)?;

        if token.tenant_id.is_nil() || token.integration_id.is_nil() || token.user_id.is_nil() {
            return Err(StateTokenError::Invalid);
        }

        if token.nonce.len() < MIN_NONCE_LEN
            || !token.nonce.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(StateTokenError::Invalid);
        }

        let age_ms = token.age_ms(now);
        if age_ms < 0 {
            // Issued in the future: forged or badly skewed, either way invalid
            return Err(StateTokenError::Invalid);
        }
        if age_ms > STATE_TTL_SECONDS * 1000 {
            return Err(StateTokenError::Expired { age_ms });
        }

        Ok(token)
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, StateTokenError> {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| StateTokenError::Encoding(format!("mac init: {}", e)))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
