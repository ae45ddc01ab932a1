//! Shared constants for VLVT services.

/// Default Redis connection URL for the shared rate-limit store
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default gate HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Default SQLite database path
pub const DEFAULT_DATABASE_PATH: &str = "data/vlvt.db";

/// Default signature timestamp tolerance (5 minutes)
pub const DEFAULT_TIMESTAMP_TOLERANCE_MS: i64 = 300_000;

/// Maximum request body buffered for signature verification (1 MiB)
pub const DEFAULT_MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

/// Random bytes in a CSRF token
pub const DEFAULT_CSRF_TOKEN_BYTES: usize = 32;

/// CSRF cookie lifetime (24 hours)
pub const DEFAULT_CSRF_MAX_AGE_SECS: u64 = 86_400;

/// How often the in-memory counter store drops expired windows
pub const MEMORY_STORE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Signing secret used outside production when none is configured.
/// Never valid in production; startup fails there instead.
pub const DEV_SIGNING_SECRET: &str = "dev-only-insecure-signing-secret-do-not-deploy";

/// Caller name reported when an internal request carries no service claim
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Principal id logged for requests without one
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Remote address used when no network origin can be resolved
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Deployment environment name that enforces configured secrets
pub const PRODUCTION_ENV: &str = "production";

/// Redis/identity key prefixes
pub mod keys {
    /// Rate limit counters: rl:{policy}:user:{id} / rl:{policy}:ip:{addr}
    pub const RATELIMIT_PREFIX: &str = "rl";

    /// Connection-scoped limiter identities: ws:user:{id} / ws:ip:{addr}
    pub const SOCKET_PREFIX: &str = "ws";
}

/// HTTP header names
pub mod headers {
    /// Request signature (client -> service)
    pub const X_SIGNATURE: &str = "x-signature";

    /// Request timestamp in epoch milliseconds (client -> service)
    pub const X_TIMESTAMP: &str = "x-timestamp";

    /// Internal request signature (service -> service)
    pub const X_INTERNAL_SIGNATURE: &str = "x-internal-signature";

    /// Internal request timestamp in epoch milliseconds
    pub const X_INTERNAL_TIMESTAMP: &str = "x-internal-timestamp";

    /// Calling service name (signed)
    pub const X_INTERNAL_SERVICE: &str = "x-internal-service";

    /// CSRF token echoed from the cookie
    pub const X_CSRF_TOKEN: &str = "x-csrf-token";

    /// Authenticated user id, injected by the upstream session service
    pub const X_USER_ID: &str = "x-user-id";

    /// Client address chain from a trusted reverse proxy
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

    /// Rate limit headers
    pub const RATELIMIT_LIMIT: &str = "ratelimit-limit";
    pub const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
    pub const RATELIMIT_RESET: &str = "ratelimit-reset";
}

/// Cookie names
pub mod cookies {
    /// Double-submit CSRF cookie (readable by client script)
    pub const CSRF_TOKEN: &str = "csrf-token";
}
