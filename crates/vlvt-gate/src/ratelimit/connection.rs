//! Sliding-window limits for a single persistent connection.
//!
//! State lives in the handler task that owns the connection and is dropped
//! with it, so no locking is involved.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;

/// Budget for one event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EventLimit {
    pub max_events: usize,
    pub window_ms: i64,
}

impl EventLimit {
    pub const fn new(max_events: usize, window_ms: i64) -> Self {
        Self {
            max_events,
            window_ms,
        }
    }
}

/// Event types a chat connection is budgeted for, before configuration overrides
pub fn default_event_limits() -> HashMap<String, EventLimit> {
    HashMap::from([
        ("send_message".to_string(), EventLimit::new(30, 60_000)),
        ("typing".to_string(), EventLimit::new(20, 10_000)),
        ("read_receipt".to_string(), EventLimit::new(60, 60_000)),
        ("join_room".to_string(), EventLimit::new(10, 60_000)),
    ])
}

/// Result of checking one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDecision {
    pub allowed: bool,
    /// `None` for event types without a budget
    pub remaining: Option<usize>,
    pub retry_after_ms: Option<i64>,
}

impl EventDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: None,
            retry_after_ms: None,
        }
    }
}

/// Frame sent on the connection's error channel when an event is refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitFrame {
    pub event: &'static str,
    pub code: &'static str,
    pub message: String,
    pub retry_after: u64,
}

impl RateLimitFrame {
    pub fn new(event: &str, retry_after_ms: i64) -> Self {
        Self {
            event: "error",
            code: "RATE_LIMIT_EXCEEDED",
            message: format!("Too many {} events", event),
            retry_after: (retry_after_ms.max(0) as u64).div_ceil(1000),
        }
    }
}

/// Called with `(identity, event, retry_after_ms)` on every refusal
pub type ViolationHook = Arc<dyn Fn(&str, &str, i64) + Send + Sync>;

/// Per-connection sliding-window limiter
pub struct ConnectionRateLimiter {
    identity: String,
    limits: Arc<HashMap<String, EventLimit>>,
    windows: HashMap<String, VecDeque<i64>>,
    clock: Arc<dyn Clock>,
    on_violation: Option<ViolationHook>,
    log_violations: bool,
}

impl std::fmt::Debug for ConnectionRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRateLimiter")
            .field("identity", &self.identity)
            .field("events", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionRateLimiter {
    pub fn new(
        identity: impl Into<String>,
        limits: Arc<HashMap<String, EventLimit>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identity: identity.into(),
            limits,
            windows: HashMap::new(),
            clock,
            on_violation: None,
            log_violations: true,
        }
    }

    pub fn with_violation_hook(mut self, hook: ViolationHook) -> Self {
        self.on_violation = Some(hook);
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_violations = enabled;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Check `event` and record it if allowed
    pub fn check(&mut self, event: &str) -> EventDecision {
        let Some(limit) = self.limits.get(event).copied() else {
            return EventDecision::unlimited();
        };
        let now = self.clock.now_millis();
        let window = self.windows.entry(event.to_string()).or_default();
        prune(window, now, limit.window_ms);

        if window.len() >= limit.max_events {
            let retry_after_ms = retry_after(window, now, limit.window_ms);
            self.report(event, retry_after_ms);
            return EventDecision {
                allowed: false,
                remaining: Some(0),
                retry_after_ms: Some(retry_after_ms),
            };
        }

        window.push_back(now);
        EventDecision {
            allowed: true,
            remaining: Some(limit.max_events - window.len()),
            retry_after_ms: None,
        }
    }

    /// Report what `check` would decide, without recording anything
    pub fn peek(&self, event: &str) -> EventDecision {
        let Some(limit) = self.limits.get(event).copied() else {
            return EventDecision::unlimited();
        };
        let now = self.clock.now_millis();
        let cutoff = now - limit.window_ms;
        let live: VecDeque<i64> = self
            .windows
            .get(event)
            .map(|w| w.iter().copied().filter(|&t| t > cutoff).collect())
            .unwrap_or_default();

        if live.len() >= limit.max_events {
            return EventDecision {
                allowed: false,
                remaining: Some(0),
                retry_after_ms: Some(retry_after(&live, now, limit.window_ms)),
            };
        }
        EventDecision {
            allowed: true,
            remaining: Some(limit.max_events - live.len()),
            retry_after_ms: None,
        }
    }

    pub fn reset(&mut self, event: &str) {
        self.windows.remove(event);
    }

    pub fn reset_all(&mut self) {
        self.windows.clear();
    }

    fn report(&self, event: &str, retry_after_ms: i64) {
        if self.log_violations {
            warn!(
                identity = %self.identity,
                event = %event,
                retry_after_ms,
                "Socket rate limit exceeded"
            );
        }
        if let Some(hook) = &self.on_violation {
            hook(&self.identity, event, retry_after_ms);
        }
    }
}

fn prune(window: &mut VecDeque<i64>, now: i64, window_ms: i64) {
    let cutoff = now - window_ms;
    while window.front().is_some_and(|&t| t <= cutoff) {
        window.pop_front();
    }
}

fn retry_after(window: &VecDeque<i64>, now: i64, window_ms: i64) -> i64 {
    window
        .front()
        .map_or(0, |&oldest| (window_ms - (now - oldest)).max(0))
}
