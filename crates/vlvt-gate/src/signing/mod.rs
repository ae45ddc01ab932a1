//! HMAC request signing.
//!
//! Two header namespaces share one verifier:
//! - client → service: `X-Signature` / `X-Timestamp`
//! - service → service: `X-Internal-Signature` / `X-Internal-Timestamp` /
//!   `X-Internal-Service`, with its own secret and no exemptions

mod middleware;
mod primitives;
mod verifier;

pub use middleware::{SignatureGuard, require_signature};
pub(crate) use middleware::request_path;
pub use primitives::{CanonicalRequest, constant_time_eq, hash_body, sign, sign_canonical};
pub use verifier::{
    SchemeKind, SignatureFailure, SignatureScheme, SignatureVerifier, SignedHeaders,
    SignedRequest, Verification, VerifierSettings,
};
