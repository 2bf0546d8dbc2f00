//! Opaque token and code generation.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

/// Generate an opaque secret: 256 bits of CSPRNG output, unpadded base64url
/// (43 characters). Used for authorization codes, access tokens and refresh
/// tokens alike.
#[must_use]
pub fn generate() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
