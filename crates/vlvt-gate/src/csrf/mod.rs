//! Double-submit cookie CSRF protection.
//!
//! The token lives in a script-readable cookie; browsers echo it in
//! `X-CSRF-Token`. A cross-site page cannot read the cookie, so it cannot
//! forge the echo.

mod middleware;
mod protection;
mod token;

pub use middleware::{csrf_protection, issue_csrf_token};
pub use protection::{AllowReason, CsrfDecision, CsrfProtection, IssuedToken};
pub use token::{CookieOptions, SameSite, cookie_value, generate_token, tokens_match};
