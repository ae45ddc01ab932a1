//! CSRF middleware and token issuance endpoint.

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

use super::protection::{CsrfDecision, CsrfProtection};
use crate::principal::principal_id;
use crate::response::Rejection;
use crate::signing::request_path;

/// Reject state-changing requests whose header token does not echo the cookie
pub async fn csrf_protection(
    State(csrf): State<Arc<CsrfProtection>>,
    req: Request,
    next: Next,
) -> Response {
    let path = request_path(&req);
    match csrf.check(req.method(), &path, req.headers()) {
        CsrfDecision::Allow(_) => next.run(req).await,
        CsrfDecision::Reject(code) => {
            warn!(
                method = %req.method(),
                path = %path,
                user_id = %principal_id(req.extensions()),
                code = %code,
                "CSRF validation failed"
            );
            Rejection::new(code).into_response()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    success: bool,
    csrf_token: String,
}

/// Issue a fresh token as a script-readable cookie and in the body
pub async fn issue_csrf_token(State(csrf): State<Arc<CsrfProtection>>) -> Response {
    match csrf.issue() {
        Ok(issued) => (
            [(SET_COOKIE, issued.set_cookie)],
            Json(CsrfTokenResponse {
                success: true,
                csrf_token: issued.token,
            }),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "Failed to build CSRF cookie");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
