//! PKCE (Proof Key for Code Exchange) utilities for OAuth 2.0
//!
//! Implements PKCE as defined in RFC 7636 with S256 (SHA-256) challenge method.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use la_types::{AuthError, AuthResult};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// PKCE challenge containing code verifier and challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// Code verifier (random string, 43-128 characters)
    pub code_verifier: String,

    /// Code challenge (BASE64URL(SHA256(code_verifier)))
    pub code_challenge: String,

    /// Challenge method (always "S256" for SHA-256)
    pub code_challenge_method: String,
}

/// Fill a buffer from the platform's secure RNG.
///
/// No fallback: if the CSPRNG is unavailable the attempt fails.
pub(crate) fn random_bytes(n: usize) -> AuthResult<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; n];
    rng.fill(&mut bytes)
        .map_err(|_| AuthError::RandomGeneration("platform secure RNG unavailable".to_string()))?;
    Ok(bytes)
}

pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub(crate) fn base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Generate a PKCE code verifier
///
/// The verifier is the base64url encoding of 32 secure random bytes, giving a
/// 43-character string drawn from the RFC 7636 unreserved alphabet.
pub fn generate_code_verifier() -> AuthResult<String> {
    Ok(base64url(&random_bytes(32)?))
}

/// Base64url-encode the SHA-256 digest of a string, without padding
pub fn sha256_base64url(input: &str) -> String {
    base64url(&sha256(input.as_bytes()))
}

/// Generate a PKCE challenge for the authorization code flow
///
/// Creates a cryptographically secure code verifier and derives the code
/// challenge as BASE64URL(SHA256(verifier)). The challenge travels in the
/// authorization URL; the verifier is withheld until the token exchange.
///
/// # Returns
/// * PKCE challenge containing verifier, challenge, and method ("S256")
pub fn generate_pkce_challenge() -> AuthResult<PkceChallenge> {
    let code_verifier = generate_code_verifier()?;
    let code_challenge = sha256_base64url(&code_verifier);

    Ok(PkceChallenge {
        code_verifier,
        code_challenge,
        code_challenge_method: "S256".to_string(),
    })
}
