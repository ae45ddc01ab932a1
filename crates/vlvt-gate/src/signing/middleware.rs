//! Axum middleware enforcing request signatures.
//!
//! The body is buffered (bounded), hashed, and handed back to the inner
//! service unchanged.

use axum::{
    body::{Body, to_bytes},
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use vlvt_common::{CallerService, ErrorCode};

use super::verifier::{SchemeKind, SignatureVerifier, SignedRequest};
use crate::principal::principal_id;
use crate::response::Rejection;

/// Middleware state: a verifier plus the buffering limit
#[derive(Clone)]
pub struct SignatureGuard {
    pub verifier: Arc<SignatureVerifier>,
    pub max_body_bytes: usize,
}

impl SignatureGuard {
    pub fn new(verifier: SignatureVerifier, max_body_bytes: usize) -> Self {
        Self {
            verifier: Arc::new(verifier),
            max_body_bytes,
        }
    }
}

/// Path as the client sent it, even when mounted under a nested router
pub(crate) fn request_path(req: &Request) -> String {
    req.extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

/// Verify the request signature of the guard's scheme.
///
/// Internal-scheme requests that pass get a [`CallerService`] extension and an
/// audit log entry.
pub async fn require_signature(
    State(guard): State<SignatureGuard>,
    req: Request,
    next: Next,
) -> Response {
    let verifier = &guard.verifier;
    let path = request_path(&req);

    if verifier.is_exempt(req.method(), &path) {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, guard.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(
                method = %parts.method,
                path = %path,
                user_id = %principal_id(&parts.extensions),
                code = %ErrorCode::PayloadTooLarge,
                limit = guard.max_body_bytes,
                "Signed request body too large or unreadable"
            );
            return Rejection::new(ErrorCode::PayloadTooLarge).into_response();
        }
    };

    let result = verifier.verify(&SignedRequest::from_headers(
        verifier.scheme(),
        parts.method.as_str(),
        &path,
        &parts.headers,
        Some(bytes.as_ref()),
    ));

    if !result.valid {
        let code = result.code.unwrap_or(match verifier.scheme().kind {
            SchemeKind::Client => ErrorCode::SignatureInvalid,
            SchemeKind::Internal => ErrorCode::InternalSignatureInvalid,
        });
        warn!(
            method = %parts.method,
            path = %path,
            user_id = %principal_id(&parts.extensions),
            code = %code,
            "Request signature rejected"
        );
        return Rejection::new(code).into_response();
    }

    if verifier.scheme().kind == SchemeKind::Internal {
        if let Some(service) = result.principal {
            info!(
                target: "audit",
                service = %service,
                method = %parts.method,
                path = %path,
                "Internal service call verified"
            );
            parts.extensions.insert(CallerService(service));
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
