//! HTTP route wiring.
//!
//! Guard order on the mutating API routes, outermost first:
//! ```text
//! principal → route rate limit → CSRF → request signature → handler
//! ```

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::after_hours::require_after_hours_access;
use crate::csrf::{csrf_protection, issue_csrf_token};
use crate::principal::attach_principal;
use crate::ratelimit::{HttpRateLimiter, rate_limit};
use crate::signing::require_signature;
use crate::state::AppState;

mod api;
mod chat;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let messages = guarded_api(
        Router::new().route("/api/messages", post(api::send_message)),
        &state,
        state.limiters.route("messages"),
    );
    let profile = guarded_api(
        Router::new().route("/api/profile", put(api::update_profile)),
        &state,
        state.limiters.route("profile"),
    );

    let internal = Router::new()
        .route("/internal/cleanup", post(api::internal_cleanup))
        .route_layer(from_fn_with_state(
            state.internal_signatures.clone(),
            require_signature,
        ));

    let after_hours = Router::new()
        .route("/after-hours/session", get(api::after_hours_session))
        .route_layer(from_fn_with_state(
            state.after_hours.clone(),
            require_after_hours_access,
        ))
        .route_layer(from_fn_with_state(
            state.limiters.route("after_hours"),
            rate_limit,
        ));

    let csrf_token = Router::new()
        .route("/csrf-token", get(issue_csrf_token))
        .route_layer(from_fn_with_state(state.limiters.route("general"), rate_limit));

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Chat transport
        .route("/ws", get(chat::chat_socket))
        .merge(csrf_token)
        .merge(messages)
        .merge(profile)
        .merge(internal)
        .merge(after_hours)
        .layer(from_fn(attach_principal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wrap browser-facing mutating routes in the full guard stack
fn guarded_api(
    routes: Router<AppState>,
    state: &AppState,
    limiter: HttpRateLimiter,
) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(
            state.client_signatures.clone(),
            require_signature,
        ))
        .route_layer(from_fn_with_state(state.csrf.clone(), csrf_protection))
        .route_layer(from_fn_with_state(limiter, rate_limit))
        .route_layer(from_fn(api::require_principal))
}
