//! RFC 7638 JWK thumbprints
//!
//! The thumbprint is the SHA-256 of a canonical JSON object containing only
//! the required members for the key type, in lexicographic member order,
//! base64url-encoded without padding. Member values are re-encoded from the
//! decoded key material, which normalizes any non-canonical base64url in the
//! source JWK.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use super::jwk::KeyMaterial;

/// Compute the RFC 7638 SHA-256 thumbprint of a key, base64url without
/// padding.
#[must_use]
pub fn jwk_thumbprint(material: &KeyMaterial) -> String {
    let canonical = match material {
        KeyMaterial::Rsa { n, e } => format!(
            "{{\"e\":\"{}\",\"kty\":\"RSA\",\"n\":\"{}\"}}",
            URL_SAFE_NO_PAD.encode(e),
            URL_SAFE_NO_PAD.encode(n)
        ),
        KeyMaterial::Ec { curve, x, y } => format!(
            "{{\"crv\":\"{}\",\"kty\":\"EC\",\"x\":\"{}\",\"y\":\"{}\"}}",
            curve.name(),
            URL_SAFE_NO_PAD.encode(x),
            URL_SAFE_NO_PAD.encode(y)
        ),
        KeyMaterial::Okp { curve, x } => format!(
            "{{\"crv\":\"{}\",\"kty\":\"OKP\",\"x\":\"{}\"}}",
            curve.name(),
            URL_SAFE_NO_PAD.encode(x)
        ),
    };
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}
