//! Fixed-window HTTP rate limiting per route policy.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use vlvt_common::constants::headers::{RATELIMIT_LIMIT, RATELIMIT_REMAINING, RATELIMIT_RESET};
use vlvt_common::constants::keys::RATELIMIT_PREFIX;
use vlvt_common::{Principal, VlvtError};

use super::identity::{identity_key, remote_address};
use super::store::CounterStore;
use crate::principal::principal_id;
use crate::response::Rejection;
use crate::signing::request_path;

/// Budget for one named route group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RoutePolicy {
    pub max_requests: u64,
    pub window_ms: u64,

    /// Key by user when a principal is present; `false` always keys by IP
    #[serde(default = "default_per_user")]
    pub per_user: bool,
}

fn default_per_user() -> bool {
    true
}

impl RoutePolicy {
    pub const fn new(max_requests: u64, window_ms: u64, per_user: bool) -> Self {
        Self {
            max_requests,
            window_ms,
            per_user,
        }
    }
}

/// Route groups every deployment has, before configuration overrides
pub fn default_policies() -> HashMap<String, RoutePolicy> {
    HashMap::from([
        ("general".to_string(), RoutePolicy::new(100, 15 * 60_000, true)),
        ("auth".to_string(), RoutePolicy::new(10, 15 * 60_000, false)),
        ("messages".to_string(), RoutePolicy::new(30, 60_000, true)),
        ("profile".to_string(), RoutePolicy::new(20, 60_000, true)),
        ("after_hours".to_string(), RoutePolicy::new(60, 60_000, true)),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u64,
        remaining: u64,
        reset_after_ms: u64,
    },
    Limited {
        limit: u64,
        retry_after_ms: u64,
    },
}

/// One route group's limiter over a shared counter store
#[derive(Debug, Clone)]
pub struct HttpRateLimiter {
    name: Arc<str>,
    policy: RoutePolicy,
    store: Arc<dyn CounterStore>,
    trust_proxy: bool,
}

impl HttpRateLimiter {
    pub fn new(
        name: &str,
        policy: RoutePolicy,
        store: Arc<dyn CounterStore>,
        trust_proxy: bool,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            store,
            trust_proxy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> RoutePolicy {
        self.policy
    }

    /// Counter key for a caller of this route group
    pub fn key_for(&self, principal: Option<&Principal>, remote: &str) -> String {
        let prefix = format!("{}:{}", RATELIMIT_PREFIX, self.name);
        let principal = if self.policy.per_user { principal } else { None };
        identity_key(&prefix, principal, remote)
    }

    /// Count one request against `key`
    pub async fn check(&self, key: &str) -> Result<RateDecision, VlvtError> {
        let window = self.store.increment(key, self.policy.window_ms).await?;
        let limit = self.policy.max_requests;
        if window.count > limit {
            return Ok(RateDecision::Limited {
                limit,
                retry_after_ms: window.reset_after_ms.max(1),
            });
        }
        Ok(RateDecision::Allowed {
            limit,
            remaining: limit - window.count,
            reset_after_ms: window.reset_after_ms,
        })
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
}

/// Apply a route group's budget. Store errors let the request through.
pub async fn rate_limit(
    State(limiter): State<HttpRateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let remote = remote_address(req.headers(), peer, limiter.trust_proxy);
    let key = limiter.key_for(req.extensions().get::<Principal>(), &remote);

    match limiter.check(&key).await {
        Ok(RateDecision::Allowed {
            limit,
            remaining,
            reset_after_ms,
        }) => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            insert_header(headers, RATELIMIT_LIMIT, limit);
            insert_header(headers, RATELIMIT_REMAINING, remaining);
            insert_header(headers, RATELIMIT_RESET, reset_after_ms.div_ceil(1000));
            response
        }
        Ok(RateDecision::Limited {
            limit,
            retry_after_ms,
        }) => {
            warn!(
                method = %req.method(),
                path = %request_path(&req),
                user_id = %principal_id(req.extensions()),
                route = %limiter.name(),
                key = %key,
                retry_after_ms,
                "Rate limit exceeded"
            );
            let mut response = Rejection::rate_limited(retry_after_ms).into_response();
            let headers = response.headers_mut();
            insert_header(headers, RATELIMIT_LIMIT, limit);
            insert_header(headers, RATELIMIT_REMAINING, 0);
            response
        }
        Err(e) => {
            error!(route = %limiter.name(), key = %key, error = %e, "Rate limit store error");
            next.run(req).await
        }
    }
}

/// Every configured route limiter, built once at startup
#[derive(Debug, Clone)]
pub struct RateLimiters {
    limiters: HashMap<String, HttpRateLimiter>,
    fallback: HttpRateLimiter,
}

impl RateLimiters {
    /// Defaults overlaid with `overrides`, all sharing `store`
    pub fn new(
        overrides: &HashMap<String, RoutePolicy>,
        store: Arc<dyn CounterStore>,
        trust_proxy: bool,
    ) -> Self {
        let mut policies = default_policies();
        policies.extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));

        let general = policies
            .get("general")
            .copied()
            .unwrap_or(RoutePolicy::new(100, 15 * 60_000, true));
        let fallback = HttpRateLimiter::new("general", general, store.clone(), trust_proxy);

        let limiters = policies
            .into_iter()
            .map(|(name, policy)| {
                let limiter = HttpRateLimiter::new(&name, policy, store.clone(), trust_proxy);
                (name, limiter)
            })
            .collect();

        Self { limiters, fallback }
    }

    /// Limiter for a route group; unknown names share the `general` budget
    pub fn route(&self, name: &str) -> HttpRateLimiter {
        match self.limiters.get(name) {
            Some(limiter) => limiter.clone(),
            None => {
                warn!(route = %name, "No rate limit policy, using general");
                self.fallback.clone()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::ratelimit::store::{FallbackStore, MemoryStore, tests::FailingStore};
    use crate::testing::LogCapture;
    use axum::{
        Extension, Router,
        body::{Body, to_bytes},
        http::{Request as HttpRequest, StatusCode, header::RETRY_AFTER},
        middleware::from_fn_with_state,
        routing::post,
    };
    use tower::ServiceExt;

    fn limiter(policy: RoutePolicy, clock: &MockClock) -> HttpRateLimiter {
        HttpRateLimiter::new(
            "messages",
            policy,
            Arc::new(MemoryStore::new(Arc::new(clock.clone()))),
            false,
        )
    }

    #[test]
    fn test_key_respects_per_user() {
        let clock = MockClock::new(0);
        let alice = Principal::new("alice");

        let per_user = limiter(RoutePolicy::new(5, 1_000, true), &clock);
        assert_eq!(
            per_user.key_for(Some(&alice), "10.0.0.1"),
            "rl:messages:user:alice"
        );

        let per_ip = limiter(RoutePolicy::new(5, 1_000, false), &clock);
        assert_eq!(
            per_ip.key_for(Some(&alice), "10.0.0.1"),
            "rl:messages:ip:10.0.0.1"
        );
    }

    #[tokio::test]
    async fn test_limit_then_window_reset() {
        let clock = MockClock::new(0);
        let limiter = limiter(RoutePolicy::new(2, 60_000, true), &clock);

        assert_eq!(
            limiter.check("k").await.unwrap(),
            RateDecision::Allowed { limit: 2, remaining: 1, reset_after_ms: 60_000 }
        );
        clock.advance(1_000);
        assert!(matches!(
            limiter.check("k").await.unwrap(),
            RateDecision::Allowed { remaining: 0, .. }
        ));
        assert_eq!(
            limiter.check("k").await.unwrap(),
            RateDecision::Limited { limit: 2, retry_after_ms: 59_000 }
        );

        clock.advance(59_000);
        assert!(matches!(
            limiter.check("k").await.unwrap(),
            RateDecision::Allowed { remaining: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let clock = MockClock::new(0);
        let limiter = limiter(RoutePolicy::new(1, 60_000, true), &clock);
        let alice = limiter.key_for(Some(&Principal::new("alice")), "10.0.0.1");
        let bob = limiter.key_for(Some(&Principal::new("bob")), "10.0.0.1");

        assert!(matches!(limiter.check(&alice).await.unwrap(), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check(&alice).await.unwrap(), RateDecision::Limited { .. }));
        assert!(matches!(limiter.check(&bob).await.unwrap(), RateDecision::Allowed { .. }));
    }

    #[tokio::test]
    async fn test_user_shares_budget_across_addresses() {
        let clock = MockClock::new(0);
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let limiter = HttpRateLimiter::new("messages", RoutePolicy::new(30, 60_000, true), store, true);
        let app = Router::new()
            .route("/api/messages", post(|| async { "sent" }))
            .layer(from_fn_with_state(limiter, rate_limit));
        let addresses = ["10.0.0.1", "10.0.0.2", "192.168.1.7", "172.16.4.20"];
        let request = |ip: &str, user: Option<&str>| {
            let mut req = HttpRequest::post("/api/messages")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap();
            if let Some(user) = user {
                req.extensions_mut().insert(Principal::new(user));
            }
            req
        };

        for i in 0..30 {
            let ip = addresses[i % addresses.len()];
            let response = app.clone().oneshot(request(ip, Some("alice"))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "request {i} from {ip}");
        }
        for ip in addresses {
            let response = app.clone().oneshot(request(ip, Some("alice"))).await.unwrap();
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS, "from {ip}");
        }

        // The addresses themselves still have budget for other callers
        let response = app.clone().oneshot(request("10.0.0.1", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(request("10.0.0.1", Some("bob"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_limiters_overlay_defaults() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new(Arc::new(MockClock::new(0))));
        let overrides = HashMap::from([
            ("messages".to_string(), RoutePolicy::new(5, 10_000, true)),
            ("uploads".to_string(), RoutePolicy::new(3, 60_000, true)),
        ]);
        let limiters = RateLimiters::new(&overrides, store, false);

        assert_eq!(limiters.route("messages").policy(), RoutePolicy::new(5, 10_000, true));
        assert_eq!(limiters.route("uploads").policy().max_requests, 3);
        assert!(!limiters.route("auth").policy().per_user);
        assert_eq!(limiters.route("nope").name(), "general");
    }

    fn app(limiter: HttpRateLimiter) -> Router {
        Router::new()
            .route("/api/messages", post(|| async { "sent" }))
            .layer(from_fn_with_state(limiter, rate_limit))
            .layer(Extension(Principal::new("alice")))
    }

    #[tokio::test]
    async fn test_middleware_headers_and_denial() {
        let clock = MockClock::new(0);
        let app = app(limiter(RoutePolicy::new(1, 30_000, true), &clock));
        let request = || HttpRequest::post("/api/messages").body(Body::empty()).unwrap();

        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-limit"], "1");
        assert_eq!(response.headers()["ratelimit-remaining"], "0");
        assert_eq!(response.headers()["ratelimit-reset"], "30");

        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "30");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["retryAfter"], 30);
    }

    #[tokio::test]
    async fn test_denial_logged_with_request_and_principal() {
        let clock = MockClock::new(0);
        let app = app(limiter(RoutePolicy::new(1, 30_000, true), &clock));
        let request = || HttpRequest::post("/api/messages").body(Body::empty()).unwrap();
        app.clone().oneshot(request()).await.unwrap();

        let (logs, _guard) = LogCapture::start();
        app.oneshot(request()).await.unwrap();

        let warnings = logs.warnings();
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        let line = &warnings[0];
        assert!(line.contains("method=POST"), "{line}");
        assert!(line.contains("path=/api/messages"), "{line}");
        assert!(line.contains("user_id=alice"), "{line}");
        assert!(line.contains("route=messages"), "{line}");
    }

    #[tokio::test]
    async fn test_shared_store_outage_does_not_fail_requests() {
        let store = Arc::new(FallbackStore::new(Arc::new(MockClock::new(0))));
        store.install(Arc::new(FailingStore));
        let limiter = HttpRateLimiter::new("messages", RoutePolicy::new(1, 1_000, true), store, false);
        let app = app(limiter);

        let response = app
            .clone()
            .oneshot(HttpRequest::post("/api/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Memory still enforces the budget during the outage
        let response = app
            .oneshot(HttpRequest::post("/api/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
