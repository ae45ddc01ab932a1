//! Double-submit CSRF verification.
//!
//! Decision order, first match wins:
//! ```text
//! skip path      → allow
//! safe method    → allow
//! bearer auth    → allow
//! no cookie      → CSRF_TOKEN_MISSING
//! no header      → CSRF_HEADER_MISSING
//! mismatch       → CSRF_TOKEN_INVALID
//! otherwise      → allow
//! ```

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header::InvalidHeaderValue};

use vlvt_common::ErrorCode;

use super::token::{CookieOptions, cookie_value, generate_token, tokens_match};
use crate::exemptions::{PathRules, has_bearer_auth, is_safe_method};

/// Why a request was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    SkippedPath,
    SafeMethod,
    BearerAuth,
    TokenMatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfDecision {
    Allow(AllowReason),
    Reject(ErrorCode),
}

/// A freshly issued token and its `Set-Cookie` header value
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub set_cookie: HeaderValue,
}

/// Configured double-submit verifier and token issuer
#[derive(Debug, Clone)]
pub struct CsrfProtection {
    pub cookie_name: String,
    pub header_name: HeaderName,
    pub token_bytes: usize,
    pub skip_paths: PathRules,
    pub cookie: CookieOptions,
}

impl CsrfProtection {
    /// Decide from already-extracted request facts
    pub fn decide(
        &self,
        method: &Method,
        path: &str,
        bearer_auth: bool,
        cookie_token: Option<&str>,
        header_token: Option<&str>,
    ) -> CsrfDecision {
        if self.skip_paths.matches(path) {
            return CsrfDecision::Allow(AllowReason::SkippedPath);
        }
        if is_safe_method(method) {
            return CsrfDecision::Allow(AllowReason::SafeMethod);
        }
        if bearer_auth {
            return CsrfDecision::Allow(AllowReason::BearerAuth);
        }
        let Some(cookie_token) = cookie_token else {
            return CsrfDecision::Reject(ErrorCode::CsrfTokenMissing);
        };
        let Some(header_token) = header_token else {
            return CsrfDecision::Reject(ErrorCode::CsrfHeaderMissing);
        };
        if !tokens_match(cookie_token, header_token) {
            return CsrfDecision::Reject(ErrorCode::CsrfTokenInvalid);
        }
        CsrfDecision::Allow(AllowReason::TokenMatched)
    }

    /// Decide for a request's method, path, and headers
    pub fn check(&self, method: &Method, path: &str, headers: &HeaderMap) -> CsrfDecision {
        self.decide(
            method,
            path,
            has_bearer_auth(headers),
            cookie_value(headers, &self.cookie_name),
            headers
                .get(&self.header_name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim),
        )
    }

    /// Generate a token and the cookie that carries it
    pub fn issue(&self) -> Result<IssuedToken, InvalidHeaderValue> {
        let token = generate_token(self.token_bytes);
        let set_cookie = self.cookie.set_cookie(&self.cookie_name, &token)?;
        Ok(IssuedToken { token, set_cookie })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::token::SameSite;
    use axum::http::header::{AUTHORIZATION, COOKIE};

    fn protection() -> CsrfProtection {
        CsrfProtection {
            cookie_name: "csrf-token".to_string(),
            header_name: HeaderName::from_static("x-csrf-token"),
            token_bytes: 32,
            skip_paths: PathRules::new(["/auth/oauth/callback*", "/webhooks"]),
            cookie: CookieOptions {
                same_site: SameSite::Strict,
                secure: true,
                max_age_secs: 86_400,
                path: "/".to_string(),
            },
        }
    }

    #[test]
    fn test_decision_order() {
        let csrf = protection();
        let post = Method::POST;

        assert_eq!(
            csrf.decide(&post, "/webhooks/stripe", false, None, None),
            CsrfDecision::Allow(AllowReason::SkippedPath)
        );
        assert_eq!(
            csrf.decide(&Method::GET, "/api/profile", false, None, None),
            CsrfDecision::Allow(AllowReason::SafeMethod)
        );
        assert_eq!(
            csrf.decide(&post, "/api/profile", true, None, None),
            CsrfDecision::Allow(AllowReason::BearerAuth)
        );
        assert_eq!(
            csrf.decide(&post, "/api/profile", false, None, Some("tok")),
            CsrfDecision::Reject(ErrorCode::CsrfTokenMissing)
        );
        assert_eq!(
            csrf.decide(&post, "/api/profile", false, Some("tok"), None),
            CsrfDecision::Reject(ErrorCode::CsrfHeaderMissing)
        );
        assert_eq!(
            csrf.decide(&post, "/api/profile", false, Some("tok"), Some("tox")),
            CsrfDecision::Reject(ErrorCode::CsrfTokenInvalid)
        );
        assert_eq!(
            csrf.decide(&post, "/api/profile", false, Some("tok"), Some("tok")),
            CsrfDecision::Allow(AllowReason::TokenMatched)
        );
    }

    #[test]
    fn test_empty_and_length_mismatch_rejected() {
        let csrf = protection();
        let post = Method::POST;
        assert_eq!(
            csrf.decide(&post, "/api/profile", false, Some(""), Some("")),
            CsrfDecision::Reject(ErrorCode::CsrfTokenInvalid)
        );
        assert_eq!(
            csrf.decide(&post, "/api/profile", false, Some("abcd"), Some("abc")),
            CsrfDecision::Reject(ErrorCode::CsrfTokenInvalid)
        );
    }

    #[test]
    fn test_check_reads_headers() {
        let csrf = protection();
        let issued = csrf.issue().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("csrf-token={}", issued.token)).unwrap(),
        );
        headers.insert(
            "x-csrf-token",
            HeaderValue::from_str(&issued.token).unwrap(),
        );
        assert_eq!(
            csrf.check(&Method::DELETE, "/api/messages/1", &headers),
            CsrfDecision::Allow(AllowReason::TokenMatched)
        );

        headers.insert("x-csrf-token", HeaderValue::from_static("wrong"));
        assert_eq!(
            csrf.check(&Method::DELETE, "/api/messages/1", &headers),
            CsrfDecision::Reject(ErrorCode::CsrfTokenInvalid)
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer api-token"));
        assert_eq!(
            csrf.check(&Method::DELETE, "/api/messages/1", &headers),
            CsrfDecision::Allow(AllowReason::BearerAuth)
        );
    }

    #[test]
    fn test_issue_sets_readable_cookie() {
        let issued = protection().issue().unwrap();
        let cookie = issued.set_cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("csrf-token={};", issued.token)));
        assert!(cookie.contains("Secure"));
        assert!(!cookie.contains("HttpOnly"));
    }
}
