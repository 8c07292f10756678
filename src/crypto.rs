//! Credential encryption using AES-256-GCM.
//!
//! Installation credentials (the Fluid platform token and the customer's API
//! key) are stored encrypted at rest. Each ciphertext embeds a fresh random
//! nonce, so encrypting the same plaintext twice never yields the same blob,
//! and carries additional authenticated data binding it to the owning
//! installation and column so blobs cannot be replayed across tenants.
//!
//! Decryption failures are always surfaced as errors. A blob that does not
//! authenticate indicates key rotation or corruption and must never be
//! returned as plaintext.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

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

/// Secure wrapper for the master encryption key with zeroization
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

/// AAD binding a credential blob to its installation and column.
pub fn credential_aad(installation_id: &str, field: &str) -> Vec<u8> {
    format!("{}|{}", installation_id, field).into_bytes()
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // version byte || nonce || ciphertext+tag
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

    // Unversioned blobs are rejected outright rather than passed through.
    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }

    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

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

/// Encrypt a credential string for an installation column.
pub fn encrypt_credential(
    key: &CryptoKey,
    installation_id: &str,
    field: &str,
    plaintext: &str,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(
        key,
        &credential_aad(installation_id, field),
        plaintext.as_bytes(),
    )
}

/// Decrypt a credential blob for an installation column.
pub fn decrypt_credential(
    key: &CryptoKey,
    installation_id: &str,
    field: &str,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let bytes = decrypt_bytes(key, &credential_aad(installation_id, field), ciphertext)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let aad = b"inst-1|auth_token";
        let plaintext = b"fluid-token-abc";

        let encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let aad = b"inst-1|auth_token";
        let plaintext = b"same secret";

        let encrypted1 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let encrypted2 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");

        // Nonces (bytes 1-13) must differ between calls
        assert_ne!(&encrypted1[1..13], &encrypted2[1..13]);
        assert_ne!(encrypted1, encrypted2);
        assert_eq!(
            decrypt_bytes(&key, aad, &encrypted1).unwrap(),
            decrypt_bytes(&key, aad, &encrypted2).unwrap()
        );
    }

    #[test]
    fn test_cross_tenant_aad_fails() {
        let key = test_key();

        let encrypted = encrypt_credential(&key, "inst-a", "api_key", "customer api key")
            .expect("encryption succeeds");

        let result = decrypt_credential(&key, "inst-b", "api_key", &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn test_cross_field_aad_fails() {
        let key = test_key();

        let encrypted =
            encrypt_credential(&key, "inst-a", "auth_token", "tok").expect("encryption succeeds");

        assert!(decrypt_credential(&key, "inst-a", "api_key", &encrypted).is_err());
        assert_eq!(
            decrypt_credential(&key, "inst-a", "auth_token", &encrypted).unwrap(),
            "tok"
        );
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let aad = b"aad";

        let mut encrypted = encrypt_bytes(&key, aad, b"secret").expect("encryption succeeds");
        encrypted[13] ^= 0x01;

        assert!(decrypt_bytes(&key, aad, &encrypted).is_err());
    }

    #[test]
    fn test_unversioned_blob_rejected() {
        let key = test_key();
        // A plaintext value that was never encrypted must not be returned as-is.
        let result = decrypt_bytes(&key, b"aad", b"legacy-plaintext-token");
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_empty_ciphertext_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", b""),
            Err(CryptoError::EmptyCiphertext)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = test_key();
        let short = vec![VERSION_ENCRYPTED, 0x02, 0x03];
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &short),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad", b"").expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, b"aad", &encrypted).expect("decryption succeeds");
        assert!(decrypted.is_empty());
    }
}
