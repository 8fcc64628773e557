/// PKCE (Proof Key for Code Exchange)
///
/// RFC 7636 verifier generation and S256 challenge calculation, plus the
/// random `state` value sent alongside every authorization request.
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Generate a random code_verifier of 43 to 128 unreserved characters.
pub fn generate_code_verifier() -> String {
    let length = 43 + (rand::random::<u8>() % 86) as usize;

    (0..length)
        .map(|_| UNRESERVED[rand::random::<u8>() as usize % UNRESERVED.len()] as char)
        .collect()
}

/// code_challenge = BASE64URL(SHA256(ASCII(code_verifier)))
pub fn generate_code_challenge(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate an unguessable OAuth2 `state` value (256 bits, base64url).
pub fn generate_state() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE pair containing both verifier and challenge
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Kept in the pending handshake record, sent to the token endpoint
    pub code_verifier: String,

    /// Sent to the authorization endpoint
    pub code_challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
        }
    }

    /// Whether `verifier` hashes to this pair's challenge
    pub fn matches(&self, verifier: &str) -> bool {
        generate_code_challenge(verifier) == self.code_challenge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_verifier_generation() {
        let verifier = generate_code_verifier();
        assert!(verifier.len() >= 43);
        assert!(verifier.len() <= 128);

        for c in verifier.chars() {
            assert!(
                c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~',
                "Invalid character in code_verifier: {}",
                c
            );
        }
    }

    #[test]
    fn test_code_challenge_generation() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = generate_code_challenge(verifier);

        // RFC 7636 appendix B
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pkce_pair_matches() {
        let pair = PkcePair::generate();
        assert!(pair.matches(&pair.code_verifier));
        assert!(!pair.matches("wrong_verifier"));
    }

    #[test]
    fn test_state_is_random_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
