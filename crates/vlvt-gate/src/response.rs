//! Denial responses.
//!
//! Every guard answers through [`Rejection`], so status code, JSON body, and
//! headers stay consistent across signing, CSRF, rate limiting, and the gate.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};

use vlvt_common::{ErrorBody, ErrorCode};

/// A guard's refusal, rendered as `{success: false, error, code, ...}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub code: ErrorCode,
    pub retry_after_secs: Option<u64>,
}

impl Rejection {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            retry_after_secs: None,
        }
    }

    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self {
            code: ErrorCode::RateLimitExceeded,
            retry_after_secs: Some(retry_after_ms.div_ceil(1000)),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut body = ErrorBody::for_code(self.code);
        if let Some(secs) = self.retry_after_secs {
            body = body.with_retry_after(secs);
        }

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
