//! Endpoints behind the guards.
//!
//! Each handler only acknowledges; the work itself is done by the
//! downstream service the request is forwarded to.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use vlvt_common::{AckBody, CallerService, ErrorCode, Principal};

use crate::after_hours::AfterHoursAccess;
use crate::response::Rejection;

/// 401 unless a principal is attached
pub async fn require_principal(req: Request, next: Next) -> Response {
    if req.extensions().get::<Principal>().is_none() {
        return Rejection::new(ErrorCode::AuthRequired).into_response();
    }
    next.run(req).await
}

/// `POST /api/messages`
pub async fn send_message(
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> (StatusCode, Json<AckBody>) {
    debug!(user_id = %principal.user_id, bytes = body.len(), "Message accepted");
    (StatusCode::ACCEPTED, Json(AckBody::with_message("Message accepted")))
}

/// `PUT /api/profile`
pub async fn update_profile(
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Json<AckBody> {
    debug!(user_id = %principal.user_id, bytes = body.len(), "Profile update accepted");
    Json(AckBody::ok())
}

/// `POST /internal/cleanup`
pub async fn internal_cleanup(
    Extension(caller): Extension<CallerService>,
) -> (StatusCode, Json<AckBody>) {
    info!(service = %caller.name(), "Cleanup scheduled");
    (StatusCode::ACCEPTED, Json(AckBody::with_message("Cleanup scheduled")))
}

/// `GET /after-hours/session`
pub async fn after_hours_session(
    Extension(access): Extension<AfterHoursAccess>,
) -> Json<AckBody> {
    debug!(user_id = %access.user_id, "After Hours session granted");
    Json(AckBody::with_message("After Hours access granted"))
}
