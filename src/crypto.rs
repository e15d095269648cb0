//! Credential encryption using AES-256-GCM
//!
//! This module seals and opens OAuth token sets stored in the database, using
//! AES-256-GCM with additional authenticated data (AAD) that binds every blob
//! to its owning tenant and integration. A sealed blob copied onto another
//! integration row fails authentication when opened.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Fixed marker rendered wherever a credential would otherwise appear.
pub const REDACTED: &str = "[REDACTED]";

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The plaintext OAuth credential for one integration.
///
/// Exists only transiently in memory between an exchange/refresh/probe and
/// the seal that follows it. Secret fields are zeroized on drop and never
/// appear in Debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expires_at: Option<DateTime<Utc>>,
    #[zeroize(skip)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &REDACTED)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| REDACTED),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Seals and opens token sets with a process-wide key.
///
/// The key is injected once at construction and never exposed; the vault is
/// shared behind an `Arc` by every component that touches credentials.
#[derive(Debug, Clone)]
pub struct TokenVault {
    key: CryptoKey,
}

impl TokenVault {
    pub fn new(key: CryptoKey) -> Self {
        Self { key }
    }

    /// Encrypt a token set for storage on the given integration row.
    pub fn seal(
        &self,
        tenant_id: &Uuid,
        integration_id: &Uuid,
        tokens: &TokenSet,
    ) -> Result<Vec<u8>, CryptoError> {
        let plaintext = serde_json::to_vec(tokens)
            .map_err(|e| CryptoError::EncryptionFailed(format!("serialization: {}", e)))?;
        let aad = binding_aad(tenant_id, integration_id);
        encrypt_bytes(&self.key, aad.as_bytes(), &plaintext)
    }

    /// Decrypt a stored blob back into a token set.
    ///
    /// Fails closed on any AAD mismatch, tag failure, or unrecognized wire
    /// format. There is no plaintext fallback.
    pub fn open(
        &self,
        tenant_id: &Uuid,
        integration_id: &Uuid,
        ciphertext: &[u8],
    ) -> Result<TokenSet, CryptoError> {
        let aad = binding_aad(tenant_id, integration_id);
        let plaintext = decrypt_bytes(&self.key, aad.as_bytes(), ciphertext)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("deserialization: {}", e)))
    }
}

/// AAD binding a blob to its owning row.
fn binding_aad(tenant_id: &Uuid, integration_id: &Uuid) -> String {
    format!("{}|{}", tenant_id, integration_id)
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    // Create cipher
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    // Generate random nonce
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // Encrypt with AAD
    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    // Unknown version byte fails closed; stored blobs are always sealed
    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }

    // Validate minimum length (version + nonce + tag)
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    // Extract components
    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    // Create cipher
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    // Decrypt with AAD
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    fn sample_tokens() -> TokenSet {
        TokenSet {
            access_token: "ya29.sample-access".to_string(),
            refresh_token: Some("1//sample-refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes: vec!["drive.readonly".to_string()],
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_vault_roundtrip() {
        let vault = TokenVault::new(test_key());
        let tenant_id = Uuid::new_v4();
        let integration_id = Uuid::new_v4();
        let tokens = sample_tokens();

        let sealed = vault
            .seal(&tenant_id, &integration_id, &tokens)
            .expect("seal succeeds");
        let opened = vault
            .open(&tenant_id, &integration_id, &sealed)
            .expect("open succeeds");

        assert_eq!(opened, tokens);
    }

    #[test]
    fn test_vault_rejects_foreign_tenant() {
        let vault = TokenVault::new(test_key());
        let tenant_id = Uuid::new_v4();
        let integration_id = Uuid::new_v4();

        let sealed = vault
            .seal(&tenant_id, &integration_id, &sample_tokens())
            .expect("seal succeeds");

        let result = vault.open(&Uuid::new_v4(), &integration_id, &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_vault_rejects_foreign_integration() {
        let vault = TokenVault::new(test_key());
        let tenant_id = Uuid::new_v4();
        let integration_id = Uuid::new_v4();

        let sealed = vault
            .seal(&tenant_id, &integration_id, &sample_tokens())
            .expect("seal succeeds");

        let result = vault.open(&tenant_id, &Uuid::new_v4(), &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let mut encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        // Modify a byte in the ciphertext
        encrypted[13] ^= 0x01;

        let result = decrypt_bytes(&key, aad, &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn test_unversioned_payload_fails_closed() {
        let key = test_key();
        let aad = b"test-aad";
        let not_sealed = b"plaintext-token".to_vec();

        let result = decrypt_bytes(&key, aad, &not_sealed);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_empty_ciphertext_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"test-aad", &[]);
        assert!(matches!(result, Err(CryptoError::EmptyCiphertext)));
    }

    #[test]
    fn test_empty_plaintext_works() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"";

        let encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted1 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let encrypted2 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");

        // Nonces (bytes 1-13) should be different
        assert_ne!(&encrypted1[1..13], &encrypted2[1..13]);
        // But both should decrypt correctly
        let decrypted1 = decrypt_bytes(&key, aad, &encrypted1).expect("decryption succeeds");
        let decrypted2 = decrypt_bytes(&key, aad, &encrypted2).expect("decryption succeeds");
        assert_eq!(decrypted1, plaintext);
        assert_eq!(decrypted2, plaintext);
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        let result = CryptoKey::new(vec![0u8; 16]); // Too short
        assert!(result.is_err());

        let result = CryptoKey::new(vec![0u8; 64]); // Too long
        assert!(result.is_err());
    }

    #[test]
    fn test_insufficient_ciphertext_length() {
        let key = test_key();
        let aad = b"test-aad";
        let short_ciphertext = vec![VERSION_ENCRYPTED, 0x02]; // Too short for nonce + tag

        let result = decrypt_bytes(&key, aad, &short_ciphertext);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_token_set_debug_redacts_secrets() {
        let rendered = format!("{:?}", sample_tokens());
        assert!(rendered.contains(REDACTED));
        assert!(!rendered.contains("sample-access"));
        assert!(!rendered.contains("sample-refresh"));
    }
}
