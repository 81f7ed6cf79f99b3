//! PKCE pair and state generation for the authorization flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE code verifier length in bytes (before base64 encoding).
const PKCE_VERIFIER_LENGTH: usize = 32;

/// State parameter length in bytes (before base64 encoding).
const STATE_LENGTH: usize = 32;

/// PKCE challenge and verifier pair.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Code verifier (secret, persisted with the handshake).
    pub verifier: String,
    /// Code challenge (SHA-256 of the verifier, sent to the marketplace).
    pub challenge: String,
}

/// Generate a new PKCE challenge pair (S256 method).
#[must_use]
pub fn generate_pkce() -> PkcePair {
    let mut verifier_bytes = [0u8; PKCE_VERIFIER_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut verifier_bytes);
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    PkcePair {
        verifier,
        challenge,
    }
}

/// Verify a PKCE verifier against a challenge.
#[must_use]
pub fn verify_pkce(verifier: &str, challenge: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize()) == challenge
}

/// Generate a cryptographically random `state` parameter.
#[must_use]
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; STATE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_pkce() {
        let pkce = generate_pkce();

        // Base64url, no padding characters
        assert!(!pkce.verifier.is_empty());
        assert!(!pkce.verifier.contains('+'));
        assert!(!pkce.verifier.contains('/'));
        assert!(!pkce.verifier.contains('='));

        assert_ne!(pkce.verifier, pkce.challenge);
        assert!(verify_pkce(&pkce.verifier, &pkce.challenge));
    }

    #[test]
    fn test_pkce_verification_fails_with_wrong_verifier() {
        let pkce = generate_pkce();
        assert!(!verify_pkce("wrong-verifier", &pkce.challenge));
    }

    #[test]
    fn test_state_values_are_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert!(a.len() >= 40);
    }
}
