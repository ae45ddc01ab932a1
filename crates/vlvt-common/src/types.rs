//! Core types shared across VLVT services.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// The authenticated identity attached to a request or connection.
///
/// Attached by the upstream session layer; this crate never authenticates
/// users itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// The user id, if it is usable as an identity (non-empty)
    pub fn id(&self) -> Option<&str> {
        let id = self.user_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

/// The calling service of a verified internal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerService(pub String);

impl CallerService {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// JSON body of every denial response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Always false
    pub success: bool,

    /// Generic, non-revealing message
    pub error: String,

    /// Machine-readable code
    pub code: ErrorCode,

    /// Entitlement upgrade hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_verification: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_consent: Option<bool>,

    /// Seconds until the caller may retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    /// Build the body for a code, including the hint fields that code carries
    pub fn for_code(code: ErrorCode) -> Self {
        Self {
            success: false,
            error: code.message().to_string(),
            code,
            upgrade: (code == ErrorCode::PremiumRequired).then_some(true),
            requires_verification: (code == ErrorCode::VerificationRequired).then_some(true),
            requires_consent: (code == ErrorCode::ConsentRequired).then_some(true),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

/// Acknowledgement body for requests that passed every guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AckBody {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_id_rejects_blank() {
        assert_eq!(Principal::new("42").id(), Some("42"));
        assert_eq!(Principal::new("").id(), None);
        assert_eq!(Principal::new("   ").id(), None);
    }

    #[test]
    fn test_error_body_hints() {
        let body = serde_json::to_value(ErrorBody::for_code(ErrorCode::PremiumRequired)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "PREMIUM_REQUIRED");
        assert_eq!(body["upgrade"], true);
        assert!(body.get("requiresConsent").is_none());

        let body = serde_json::to_value(
            ErrorBody::for_code(ErrorCode::RateLimitExceeded).with_retry_after(12),
        )
        .unwrap();
        assert_eq!(body["retryAfter"], 12);
        assert!(body.get("upgrade").is_none());
    }

    #[test]
    fn test_consent_and_verification_hints() {
        let body = serde_json::to_value(ErrorBody::for_code(ErrorCode::ConsentRequired)).unwrap();
        assert_eq!(body["requiresConsent"], true);
        let body =
            serde_json::to_value(ErrorBody::for_code(ErrorCode::VerificationRequired)).unwrap();
        assert_eq!(body["requiresVerification"], true);
    }
}
