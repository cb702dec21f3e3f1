use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE verifier with its S256 challenge.
#[derive(Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// Generate a fresh verifier and derive its challenge.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Random code verifier: 48 bytes → 64 URL-safe characters (RFC 7636 allows 43-128).
#[must_use]
pub fn generate_code_verifier() -> String {
    random_url_safe::<48>()
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random `state` parameter, 22 characters.
#[must_use]
pub fn generate_state() -> String {
    random_url_safe::<16>()
}

/// Random OIDC `nonce`, 22 characters.
#[must_use]
pub fn generate_nonce() -> String {
    random_url_safe::<16>()
}

fn random_url_safe<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_url_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn verifier_is_64_url_safe_chars() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 64);
        assert!(is_url_safe(&verifier), "not URL-safe: {verifier}");
    }

    #[test]
    fn challenge_matches_rfc7636_example() {
        // RFC 7636 appendix B
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn generated_pair_is_consistent() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.challenge, code_challenge(&pkce.verifier));
        assert_ne!(pkce.verifier, Pkce::generate().verifier);
    }

    #[test]
    fn state_and_nonce_are_unique() {
        let state = generate_state();
        let nonce = generate_nonce();
        assert_eq!(state.len(), 22);
        assert_eq!(nonce.len(), 22);
        assert_ne!(state, generate_state());
        assert_ne!(nonce, generate_nonce());
    }
}
