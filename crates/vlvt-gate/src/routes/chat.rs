//! Chat socket transport.
//!
//! Clients send `{event, data}` text frames. Each accepted frame is acked with
//! `{event: "ack", for: <event>}`; frames over budget get a rate limit error
//! frame and the connection stays open. Delivery lives in the chat service.

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{Extensions, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

use vlvt_common::Principal;
use vlvt_common::constants::keys::SOCKET_PREFIX;

use crate::ratelimit::{ConnectionRateLimiter, RateLimitFrame, identity_key, remote_address};
use crate::state::AppState;

/// Inbound frame; only `event` is inspected
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ServerFrame {
    Ack {
        event: &'static str,
        #[serde(rename = "for")]
        for_event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining: Option<usize>,
    },
    RateLimited(RateLimitFrame),
    Invalid {
        event: &'static str,
        code: &'static str,
        message: &'static str,
    },
}

/// One connection's protocol state
struct ChatSession {
    limiter: ConnectionRateLimiter,
}

impl ChatSession {
    fn handle_text(&mut self, text: &str) -> ServerFrame {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(identity = %self.limiter.identity(), error = %e, "Malformed socket frame");
                return ServerFrame::Invalid {
                    event: "error",
                    code: "INVALID_FRAME",
                    message: "Frames must be {\"event\": string, \"data\": any}",
                };
            }
        };

        let decision = self.limiter.check(&frame.event);
        if !decision.allowed {
            return ServerFrame::RateLimited(RateLimitFrame::new(
                &frame.event,
                decision.retry_after_ms.unwrap_or_default(),
            ));
        }
        ServerFrame::Ack {
            event: "ack",
            for_event: frame.event,
            remaining: decision.remaining,
        }
    }
}

/// `GET /ws`
pub async fn chat_socket(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let remote = remote_address(&headers, peer, state.config.trust_proxy);
    let identity = identity_key(SOCKET_PREFIX, extensions.get::<Principal>(), &remote);

    let limiter = ConnectionRateLimiter::new(identity, state.event_limits.clone(), state.clock.clone())
        .with_logging(state.config.rate_limit.log_violations);

    ws.on_upgrade(move |socket| run_session(socket, ChatSession { limiter }))
}

async fn run_session(socket: WebSocket, mut session: ChatSession) {
    let identity = session.limiter.identity().to_string();
    info!(identity = %identity, "Chat socket connected");

    let (mut sender, mut receiver) = socket.split();
    while let Some(result) = receiver.next().await {
        let reply = match result {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Chat socket error");
                break;
            }
        };

        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to encode socket frame");
                continue;
            }
        };
        if let Err(e) = sender.send(Message::Text(payload.into())).await {
            warn!(identity = %identity, error = %e, "Failed to send socket frame");
            break;
        }
    }

    info!(identity = %identity, "Chat socket closed");
}
