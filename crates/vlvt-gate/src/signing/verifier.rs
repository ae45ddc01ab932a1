//! Signature verification for signed requests.
//!
//! One verifier serves both header namespaces. A [`SignatureScheme`] fixes the
//! header vocabulary and the error-code family; the secret and exemption rules
//! come from configuration.
//!
//! Checks run in order and the first failure wins:
//! ```text
//! signature present → timestamp present → timestamp numeric
//!   → |now - timestamp| <= tolerance → HMAC matches → valid
//! ```

use axum::http::header::InvalidHeaderValue;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::sync::Arc;

use vlvt_common::ErrorCode;
use vlvt_common::constants::{UNKNOWN_SERVICE, headers};

use super::primitives::{CanonicalRequest, constant_time_eq, hash_body, sign_canonical};
use crate::clock::Clock;
use crate::exemptions::{PathRules, is_safe_method};

/// Which error-code family a scheme reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeKind {
    /// Client → service (`X-Signature`)
    Client,
    /// Service → service (`X-Internal-Signature`)
    Internal,
}

/// Header vocabulary of a signing scheme
#[derive(Debug, Clone)]
pub struct SignatureScheme {
    pub kind: SchemeKind,
    pub signature_header: HeaderName,
    pub timestamp_header: HeaderName,
    /// Header carrying a signed caller claim
    pub caller_header: Option<HeaderName>,
}

impl SignatureScheme {
    pub fn client() -> Self {
        Self {
            kind: SchemeKind::Client,
            signature_header: HeaderName::from_static(headers::X_SIGNATURE),
            timestamp_header: HeaderName::from_static(headers::X_TIMESTAMP),
            caller_header: None,
        }
    }

    pub fn internal() -> Self {
        Self {
            kind: SchemeKind::Internal,
            signature_header: HeaderName::from_static(headers::X_INTERNAL_SIGNATURE),
            timestamp_header: HeaderName::from_static(headers::X_INTERNAL_TIMESTAMP),
            caller_header: Some(HeaderName::from_static(headers::X_INTERNAL_SERVICE)),
        }
    }
}

/// Reason a signed request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFailure {
    MissingSignature,
    MissingTimestamp,
    InvalidTimestampFormat,
    /// Outside the tolerance window, stale or future-dated
    Expired,
    InvalidSignature,
}

impl SignatureFailure {
    pub fn code(self, kind: SchemeKind) -> ErrorCode {
        match (kind, self) {
            (SchemeKind::Client, Self::MissingSignature) => ErrorCode::SignatureMissing,
            (SchemeKind::Client, Self::MissingTimestamp) => ErrorCode::TimestampMissing,
            (SchemeKind::Client, Self::InvalidTimestampFormat) => ErrorCode::TimestampInvalid,
            (SchemeKind::Client, Self::Expired) => ErrorCode::TimestampExpired,
            (SchemeKind::Client, Self::InvalidSignature) => ErrorCode::SignatureInvalid,
            (SchemeKind::Internal, Self::MissingSignature) => ErrorCode::InternalSignatureMissing,
            (SchemeKind::Internal, Self::MissingTimestamp) => ErrorCode::InternalTimestampMissing,
            (SchemeKind::Internal, Self::InvalidTimestampFormat) => {
                ErrorCode::InternalTimestampInvalid
            }
            (SchemeKind::Internal, Self::Expired) => ErrorCode::InternalTimestampExpired,
            (SchemeKind::Internal, Self::InvalidSignature) => ErrorCode::InternalSignatureInvalid,
        }
    }
}

/// Exemption and freshness settings
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Maximum |now - timestamp| in milliseconds
    pub tolerance_ms: i64,
    /// Paths that bypass verification
    pub skip_paths: PathRules,
    /// Let GET/HEAD/OPTIONS through unsigned
    pub skip_safe_methods: bool,
}

impl VerifierSettings {
    /// No exemptions at all
    pub fn strict(tolerance_ms: i64) -> Self {
        Self {
            tolerance_ms,
            skip_paths: PathRules::default(),
            skip_safe_methods: false,
        }
    }
}

/// The parts of a request a verifier looks at
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Raw body; absent hashes like an empty body
    pub body: Option<&'a [u8]>,
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub caller: Option<&'a str>,
}

impl<'a> SignedRequest<'a> {
    /// Pull the scheme's headers out of a header map
    pub fn from_headers(
        scheme: &SignatureScheme,
        method: &'a str,
        path: &'a str,
        headers: &'a HeaderMap,
        body: Option<&'a [u8]>,
    ) -> Self {
        let header = |name: &HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
        Self {
            method,
            path,
            body,
            signature: header(&scheme.signature_header),
            timestamp: header(&scheme.timestamp_header),
            caller: scheme.caller_header.as_ref().and_then(header),
        }
    }
}

/// Verification result. Never an error: callers turn `code` into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub code: Option<ErrorCode>,
    /// Verified caller name (internal scheme only)
    pub principal: Option<String>,
}

impl Verification {
    fn accepted(principal: Option<String>) -> Self {
        Self {
            valid: true,
            code: None,
            principal,
        }
    }

    fn rejected(code: ErrorCode) -> Self {
        Self {
            valid: false,
            code: Some(code),
            principal: None,
        }
    }
}

/// Header values a caller attaches to a signed outbound request
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub signature: String,
    pub timestamp: i64,
    pub caller: Option<String>,
}

impl SignedHeaders {
    pub fn apply_to(
        &self,
        scheme: &SignatureScheme,
        headers: &mut HeaderMap,
    ) -> Result<(), InvalidHeaderValue> {
        headers.insert(
            scheme.signature_header.clone(),
            HeaderValue::from_str(&self.signature)?,
        );
        headers.insert(
            scheme.timestamp_header.clone(),
            HeaderValue::from_str(&self.timestamp.to_string())?,
        );
        if let (Some(name), Some(caller)) = (&scheme.caller_header, &self.caller) {
            headers.insert(name.clone(), HeaderValue::from_str(caller)?);
        }
        Ok(())
    }
}

/// Stateless HMAC request verifier
#[derive(Clone)]
pub struct SignatureVerifier {
    scheme: SignatureScheme,
    secret: Arc<[u8]>,
    settings: VerifierSettings,
    clock: Arc<dyn Clock>,
}

impl SignatureVerifier {
    pub fn new(
        scheme: SignatureScheme,
        secret: impl AsRef<[u8]>,
        settings: VerifierSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheme,
            secret: Arc::from(secret.as_ref()),
            settings,
            clock,
        }
    }

    /// Service-to-service verifier: internal headers, no exemptions
    pub fn internal(secret: impl AsRef<[u8]>, tolerance_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            SignatureScheme::internal(),
            secret,
            VerifierSettings::strict(tolerance_ms),
            clock,
        )
    }

    pub fn scheme(&self) -> &SignatureScheme {
        &self.scheme
    }

    /// True if the request bypasses verification entirely
    pub fn is_exempt(&self, method: &Method, path: &str) -> bool {
        (self.settings.skip_safe_methods && is_safe_method(method))
            || self.settings.skip_paths.matches(path)
    }

    /// Verify a request. Stateless apart from reading the clock.
    pub fn verify(&self, request: &SignedRequest<'_>) -> Verification {
        match self.check(request) {
            Ok(principal) => Verification::accepted(principal),
            Err(failure) => Verification::rejected(failure.code(self.scheme.kind)),
        }
    }

    fn check(&self, request: &SignedRequest<'_>) -> Result<Option<String>, SignatureFailure> {
        let signature = non_empty(request.signature).ok_or(SignatureFailure::MissingSignature)?;
        let timestamp_raw =
            non_empty(request.timestamp).ok_or(SignatureFailure::MissingTimestamp)?;
        let timestamp: i64 = timestamp_raw
            .trim()
            .parse()
            .map_err(|_| SignatureFailure::InvalidTimestampFormat)?;

        let now = self.clock.now_millis();
        if now.abs_diff(timestamp) > self.settings.tolerance_ms.unsigned_abs() {
            return Err(SignatureFailure::Expired);
        }

        let caller = self.caller_claim(request.caller);
        let body_hash = hash_body(request.body.unwrap_or_default());
        let expected = sign_canonical(
            &self.secret,
            &CanonicalRequest {
                method: request.method,
                path: request.path,
                timestamp,
                body_hash: &body_hash,
                caller,
            },
        );

        let supplied = signature.trim().to_ascii_lowercase();
        if !constant_time_eq(supplied.as_bytes(), expected.as_bytes()) {
            return Err(SignatureFailure::InvalidSignature);
        }

        Ok(caller.map(|c| {
            if c.is_empty() {
                UNKNOWN_SERVICE.to_string()
            } else {
                c.to_string()
            }
        }))
    }

    /// Schemes with a caller header always sign the claim, empty if absent
    fn caller_claim<'a>(&self, supplied: Option<&'a str>) -> Option<&'a str> {
        self.scheme
            .caller_header
            .as_ref()
            .map(|_| supplied.unwrap_or_default().trim())
    }

    /// Sign an outbound request at the current time
    pub fn sign_outgoing(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        caller: Option<&str>,
    ) -> SignedHeaders {
        self.sign_at(method, path, body, caller, self.clock.now_millis())
    }

    /// Sign an outbound request with an explicit timestamp
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        caller: Option<&str>,
        timestamp: i64,
    ) -> SignedHeaders {
        let caller = self.caller_claim(caller);
        let body_hash = hash_body(body);
        let signature = sign_canonical(
            &self.secret,
            &CanonicalRequest {
                method,
                path,
                timestamp,
                body_hash: &body_hash,
                caller,
            },
        );
        SignedHeaders {
            signature,
            timestamp,
            caller: caller.filter(|c| !c.is_empty()).map(str::to_string),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
