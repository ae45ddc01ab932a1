use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use vlvt_common::Principal;

use super::gate::{AccessDecision, AfterHoursGate};
use crate::principal::principal_id;
use crate::response::Rejection;

/// Marker extension for requests that passed the After-Hours gate
#[derive(Debug, Clone)]
pub struct AfterHoursAccess {
    pub user_id: String,
}

pub async fn require_after_hours_access(
    State(gate): State<Arc<AfterHoursGate>>,
    mut req: Request,
    next: Next,
) -> Response {
    let decision = gate.authorize(req.extensions().get::<Principal>()).await;
    match decision {
        AccessDecision::Granted { user_id } => {
            req.extensions_mut().insert(AfterHoursAccess { user_id });
            next.run(req).await
        }
        AccessDecision::Denied(code) => {
            warn!(
                method = %req.method(),
                path = %req.uri().path(),
                user_id = %principal_id(req.extensions()),
                code = %code,
                "After Hours access denied"
            );
            Rejection::new(code).into_response()
        }
    }
}
