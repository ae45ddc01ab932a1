//! CSRF token generation and cookie plumbing.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE, header::InvalidHeaderValue};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::signing::constant_time_eq;

/// Generate a cryptographically random, URL-safe token from `bytes` random bytes
pub fn generate_token(bytes: usize) -> String {
    use rand::RngCore;

    let mut buf = vec![0u8; bytes.max(1)];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Constant-time token comparison. Empty tokens never match.
pub fn tokens_match(cookie_token: &str, header_token: &str) -> bool {
    if cookie_token.is_empty() || header_token.is_empty() {
        return false;
    }
    constant_time_eq(cookie_token.as_bytes(), header_token.as_bytes())
}

/// Find a cookie by name across all `Cookie` headers
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

/// SameSite cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Attributes of the issued CSRF cookie.
///
/// Never `HttpOnly`: client script must read the value to echo it back.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub same_site: SameSite,
    pub secure: bool,
    pub max_age_secs: u64,
    pub path: String,
}

impl CookieOptions {
    /// `Set-Cookie` value for `name=value`. `SameSite=None` always adds `Secure`.
    pub fn set_cookie(&self, name: &str, value: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}; SameSite={}",
            name,
            value,
            self.path,
            self.max_age_secs,
            self.same_site.as_str()
        );
        if self.secure || self.same_site == SameSite::None {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}
