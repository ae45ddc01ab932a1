//! Error codes and common error types for VLVT services.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable denial codes returned in every error body.
///
/// Guards never surface these as panics or `Err` values to handler code; they
/// are produced as verification results and turned into responses at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request signing (client -> service)
    SignatureMissing,
    TimestampMissing,
    TimestampInvalid,
    TimestampExpired,
    SignatureInvalid,

    // Request signing (service -> service)
    InternalSignatureMissing,
    InternalTimestampMissing,
    InternalTimestampInvalid,
    InternalTimestampExpired,
    InternalSignatureInvalid,

    // Double-submit CSRF
    CsrfTokenMissing,
    CsrfHeaderMissing,
    CsrfTokenInvalid,

    RateLimitExceeded,

    /// Signed body over the verification buffer, or unreadable
    PayloadTooLarge,

    // After-Hours gate
    AuthRequired,
    PremiumRequired,
    VerificationRequired,
    ConsentRequired,
    AuthError,
}

impl ErrorCode {
    /// Wire representation, e.g. `SIGNATURE_INVALID`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::TimestampMissing => "TIMESTAMP_MISSING",
            Self::TimestampInvalid => "TIMESTAMP_INVALID",
            Self::TimestampExpired => "TIMESTAMP_EXPIRED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::InternalSignatureMissing => "INTERNAL_SIGNATURE_MISSING",
            Self::InternalTimestampMissing => "INTERNAL_TIMESTAMP_MISSING",
            Self::InternalTimestampInvalid => "INTERNAL_TIMESTAMP_INVALID",
            Self::InternalTimestampExpired => "INTERNAL_TIMESTAMP_EXPIRED",
            Self::InternalSignatureInvalid => "INTERNAL_SIGNATURE_INVALID",
            Self::CsrfTokenMissing => "CSRF_TOKEN_MISSING",
            Self::CsrfHeaderMissing => "CSRF_HEADER_MISSING",
            Self::CsrfTokenInvalid => "CSRF_TOKEN_INVALID",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::PremiumRequired => "PREMIUM_REQUIRED",
            Self::VerificationRequired => "VERIFICATION_REQUIRED",
            Self::ConsentRequired => "CONSENT_REQUIRED",
            Self::AuthError => "AUTH_ERROR",
        }
    }

    /// Returns the HTTP status code for this denial
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SignatureMissing
            | Self::TimestampMissing
            | Self::TimestampInvalid
            | Self::TimestampExpired
            | Self::SignatureInvalid
            | Self::AuthRequired => 401,
            Self::InternalSignatureMissing
            | Self::InternalTimestampMissing
            | Self::InternalTimestampInvalid
            | Self::InternalTimestampExpired
            | Self::InternalSignatureInvalid
            | Self::CsrfTokenMissing
            | Self::CsrfHeaderMissing
            | Self::CsrfTokenInvalid
            | Self::PremiumRequired
            | Self::VerificationRequired
            | Self::ConsentRequired => 403,
            Self::PayloadTooLarge => 413,
            Self::RateLimitExceeded => 429,
            Self::AuthError => 500,
        }
    }

    /// Generic, non-revealing message for clients
    pub fn message(&self) -> &'static str {
        match self {
            Self::SignatureMissing | Self::InternalSignatureMissing => "Request signature required",
            Self::TimestampMissing | Self::InternalTimestampMissing => "Request timestamp required",
            Self::TimestampInvalid | Self::InternalTimestampInvalid => "Invalid request timestamp",
            Self::TimestampExpired | Self::InternalTimestampExpired => "Request has expired",
            Self::SignatureInvalid | Self::InternalSignatureInvalid => "Invalid request signature",
            Self::CsrfTokenMissing => "CSRF token missing",
            Self::CsrfHeaderMissing => "CSRF token header missing",
            Self::CsrfTokenInvalid => "Invalid CSRF token",
            Self::RateLimitExceeded => "Too many requests, please try again later",
            Self::PayloadTooLarge => "Request body too large",
            Self::AuthRequired => "Authentication required",
            Self::PremiumRequired => "Premium subscription required",
            Self::VerificationRequired => "Identity verification required",
            Self::ConsentRequired => "Consent required for this feature",
            Self::AuthError => "Authorization check failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common errors across VLVT components
#[derive(Debug, Error)]
pub enum VlvtError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared counter store connection/operation error
    #[error("Redis error: {0}")]
    Redis(String),
}
