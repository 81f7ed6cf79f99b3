//! Credential vault: token encryption at rest.
//!
//! Delegated access and refresh tokens are persisted only as
//! `base64(nonce || ciphertext || auth_tag)` produced by AES-256-GCM with a
//! fresh random nonce per encryption. The vault holds no state beyond the
//! key; both operations are pure functions of their inputs.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// Vault operation errors.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The configured key is not 32 bytes.
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong key, truncated or tampered ciphertext).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Encrypt a plaintext token to a base64-encoded string for DB storage.
///
/// Format: `base64(nonce || ciphertext || auth_tag)`.
pub fn encrypt_token(plaintext: &str, key: &[u8]) -> Result<String, VaultError> {
    if key.len() != KEY_LEN {
        return Err(VaultError::InvalidKeyLength(key.len()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&result))
}

/// Decrypt a base64-encoded token from DB storage back to plaintext.
pub fn decrypt_token(encoded: &str, key: &[u8]) -> Result<String, VaultError> {
    if key.len() != KEY_LEN {
        return Err(VaultError::InvalidKeyLength(key.len()));
    }

    let encrypted = BASE64
        .decode(encoded)
        .map_err(|e| VaultError::DecryptionFailed(format!("base64 decode failed: {e}")))?;

    if encrypted.len() < NONCE_SIZE + 1 {
        return Err(VaultError::DecryptionFailed(
            "ciphertext too short".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

    let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
    let ciphertext = &encrypted[NONCE_SIZE..];

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| VaultError::DecryptionFailed(e.to_string()))
}

/// Keyed vault service injected into the auth flow and credential provider.
///
/// The key never appears in logs or `Debug` output.
#[derive(Clone)]
pub struct TokenVault {
    key: Vec<u8>,
}

impl TokenVault {
    /// Create a vault from a 32-byte key.
    pub fn new(key: Vec<u8>) -> Result<Self, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InvalidKeyLength(key.len()));
        }
        Ok(Self { key })
    }

    /// Encrypt a token for storage.
    pub fn seal(&self, plaintext: &str) -> Result<String, VaultError> {
        encrypt_token(plaintext, &self.key)
    }

    /// Decrypt a stored token.
    pub fn open(&self, ciphertext: &str) -> Result<String, VaultError> {
        decrypt_token(ciphertext, &self.key)
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = "APP_USR-123456-access-token";

        let encrypted = encrypt_token(plaintext, &key).expect("encryption failed");
        let decrypted = decrypt_token(&encrypted, &key).expect("decryption failed");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_random_nonce_gives_distinct_ciphertexts() {
        let key = test_key();
        let enc1 = encrypt_token("same-token", &key).unwrap();
        let enc2 = encrypt_token("same-token", &key).unwrap();

        assert_ne!(enc1, enc2);
        assert_eq!(
            decrypt_token(&enc1, &key).unwrap(),
            decrypt_token(&enc2, &key).unwrap()
        );
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        let short_key = [0u8; 16];
        assert!(matches!(
            encrypt_token("t", &short_key),
            Err(VaultError::InvalidKeyLength(16))
        ));
        assert!(matches!(
            decrypt_token("abcd", &short_key),
            Err(VaultError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let encrypted = encrypt_token("secret", &[0x42u8; 32]).unwrap();
        assert!(decrypt_token(&encrypted, &[0x43u8; 32]).is_err());
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let key = test_key();
        assert!(decrypt_token("not base64!!!", &key).is_err());
        assert!(decrypt_token(&BASE64.encode([0u8; 4]), &key).is_err());
    }

    #[test]
    fn test_vault_service_roundtrip() {
        let vault = TokenVault::new(test_key().to_vec()).unwrap();
        let sealed = vault.seal("refresh-token-xyz").unwrap();
        assert_eq!(vault.open(&sealed).unwrap(), "refresh-token-xyz");
    }

    #[test]
    fn test_vault_rejects_short_key() {
        assert!(TokenVault::new(vec![0u8; 31]).is_err());
    }

    #[test]
    fn test_vault_debug_hides_key() {
        let vault = TokenVault::new(test_key().to_vec()).unwrap();
        let rendered = format!("{vault:?}");
        assert!(!rendered.contains("42"));
    }
}
