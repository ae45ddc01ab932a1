//! Identity-aware rate limiting.
//!
//! Two flavours share the identity rules: per-user when a principal is
//! known, per-address otherwise.
//! - [`http`]: fixed windows in a pluggable [`CounterStore`], one budget per route group
//! - [`connection`]: sliding windows owned by a single socket connection

pub mod connection;
pub mod http;
mod identity;
pub mod store;

pub use connection::{
    ConnectionRateLimiter, EventDecision, EventLimit, RateLimitFrame, ViolationHook,
    default_event_limits,
};
pub use http::{HttpRateLimiter, RateDecision, RateLimiters, RoutePolicy, rate_limit};
pub use identity::{identity_key, remote_address};
pub use store::{
    CounterStore, FallbackStore, MemoryStore, RedisStore, WindowCount, memory_sweeper,
    redis_connector,
};
