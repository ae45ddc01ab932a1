//! Principal attachment.
//!
//! Sessions are authenticated upstream; the session service forwards the
//! user id in `X-User-Id`. This layer only turns it into a [`Principal`]
//! extension for the guards behind it.

use axum::{
    extract::Request,
    http::{Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};

use vlvt_common::Principal;
use vlvt_common::constants::ANONYMOUS_PRINCIPAL;
use vlvt_common::constants::headers::X_USER_ID;

/// Principal named by the upstream session header, if any
pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    headers
        .get(X_USER_ID)
        .and_then(|v| v.to_str().ok())
        .map(Principal::new)
        .filter(|p| p.id().is_some())
}

/// Attached principal id for log fields
pub fn principal_id(extensions: &Extensions) -> &str {
    extensions
        .get::<Principal>()
        .and_then(Principal::id)
        .unwrap_or(ANONYMOUS_PRINCIPAL)
}

pub async fn attach_principal(mut req: Request, next: Next) -> Response {
    // Never trust a principal set by an earlier layer over the header
    req.extensions_mut().remove::<Principal>();
    if let Some(principal) = principal_from_headers(req.headers()) {
        req.extensions_mut().insert(principal);
    }
    next.run(req).await
}
