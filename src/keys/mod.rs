//! Key material: JWK parsing, RFC 7638 thumbprints, signature verification

pub mod jwk;
pub mod thumbprint;
pub mod verify;

pub use jwk::{EcCurve, KeyError, KeyMaterial, OkpCurve, VerificationKey};
pub use thumbprint::jwk_thumbprint;
pub use verify::{JwsAlgorithm, verify_signature};
