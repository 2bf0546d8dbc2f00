//! PKCE (RFC 7636) challenge verification, `S256` only.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::OAuthError;

/// Supported `code_challenge_method` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    /// `BASE64URL(SHA256(code_verifier))`
    S256,
}

impl ChallengeMethod {
    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }

    /// Parse an optional method parameter. An absent method means `S256`;
    /// `plain` and anything else is rejected.
    pub fn parse_optional(method: Option<&str>) -> Result<Self, OAuthError> {
        match method {
            None | Some("") => Ok(Self::S256),
            Some(m) => m.parse(),
        }
    }
}

impl FromStr for ChallengeMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(Self::S256),
            other => Err(OAuthError::UnsupportedChallengeMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the `S256` challenge for a verifier.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check `verifier` against a stored `S256` challenge.
///
/// Exact, case-sensitive, constant-time over the encoded strings.
#[must_use]
pub fn verify(verifier: &str, challenge: &str) -> bool {
    challenge_for(verifier)
        .as_bytes()
        .ct_eq(challenge.as_bytes())
        .into()
}

/// RFC 7636 §4.1 syntax: 43 to 128 characters from `[A-Za-z0-9-._~]`.
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Generate a fresh random verifier with its challenge.
#[must_use]
pub fn generate_pair() -> (String, String) {
    let verifier = super::token::generate();
    let challenge = challenge_for(&verifier);
    (verifier, challenge)
}
