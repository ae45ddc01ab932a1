//! Hash and HMAC primitives.
//!
//! Canonical string:
//! ```text
//! UPPER(method) | path | timestamp | sha256_hex(body) [ | caller ]
//! ```
//! The optional fifth field carries the caller claim of internal requests.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The fields covered by a request signature
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub timestamp: i64,
    pub body_hash: &'a str,
    /// Caller claim, present only for schemes that sign one
    pub caller: Option<&'a str>,
}

impl CanonicalRequest<'_> {
    pub fn to_canonical_string(&self) -> String {
        let mut s = format!(
            "{}|{}|{}|{}",
            self.method.to_ascii_uppercase(),
            self.path,
            self.timestamp,
            self.body_hash
        );
        if let Some(caller) = self.caller {
            s.push('|');
            s.push_str(caller);
        }
        s
    }
}

/// SHA-256 of a request body, lowercase hex
pub fn hash_body(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// HMAC-SHA256 over `UPPER(method)|path|timestamp|body_hash`, lowercase hex
pub fn sign(secret: &[u8], method: &str, path: &str, timestamp: i64, body_hash: &str) -> String {
    sign_canonical(
        secret,
        &CanonicalRequest {
            method,
            path,
            timestamp,
            body_hash,
            caller: None,
        },
    )
}

/// HMAC-SHA256 over the canonical string of `request`, lowercase hex
pub fn sign_canonical(secret: &[u8], request: &CanonicalRequest<'_>) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key of any length");
    mac.update(request.to_canonical_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time byte comparison. Inputs of different length are never equal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
