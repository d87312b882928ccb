use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;
use zeroize::Zeroizing;

use crate::errors::{AuthError, Result};

/// Per-attempt authorization handshake state
///
/// Never persisted; dropped (and the verifier zeroized) once the code has
/// been exchanged or the attempt is abandoned.
pub struct AuthorizationRequest {
    /// Page the user has to complete
    pub url: Url,
    /// CSRF nonce echoed back on the redirect
    pub state: String,
    /// PKCE code verifier for the token exchange
    pub verifier: Zeroizing<String>,
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("verifier", &"[REDACTED]")
            .finish()
    }
}

fn random_urlsafe<const N: usize>() -> Result<String> {
    let mut bytes = Zeroizing::new([0u8; N]);
    getrandom::fill(&mut bytes[..])
        .map_err(|e| AuthError::Config(format!("OS random number generator unavailable: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(&bytes[..]))
}

/// Generates a PKCE code verifier
///
/// 96 random bytes encode to 128 URL-safe characters, the RFC 7636 maximum.
pub fn generate_code_verifier() -> Result<Zeroizing<String>> {
    random_urlsafe::<96>().map(Zeroizing::new)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generates a 22-character state nonce from 16 random bytes
pub fn generate_state() -> Result<String> {
    random_urlsafe::<16>()
}

/// Constant-time comparison of the returned state against the expected one
pub fn state_matches(expected: &str, actual: &str) -> bool {
    expected.as_bytes().ct_eq(actual.as_bytes()).into()
}
