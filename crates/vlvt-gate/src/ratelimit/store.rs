//! Counter stores for the HTTP rate limiter.
//!
//! ```text
//! FallbackStore ──▶ RedisStore   (once connected, shared across instances)
//!       │
//!       └────────▶ MemoryStore   (from startup, and whenever Redis errors)
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use vlvt_common::VlvtError;

use crate::clock::Clock;

/// Hits recorded in the current fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    /// Milliseconds until the window resets
    pub reset_after_ms: u64,
}

/// Fixed-window counter capability
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Record one hit; a new window starts if none is live
    async fn increment(&self, key: &str, window_ms: u64) -> Result<WindowCount, VlvtError>;

    async fn get(&self, key: &str) -> Result<Option<WindowCount>, VlvtError>;

    async fn reset(&self, key: &str) -> Result<(), VlvtError>;

    /// Backend name reported by readiness checks
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
struct MemoryWindow {
    count: u64,
    expires_at: i64,
}

/// Process-local store. Expired windows are dropped lazily on access and by `sweep`.
#[derive(Debug)]
pub struct MemoryStore {
    windows: Mutex<HashMap<String, MemoryWindow>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Remove expired windows, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, w| w.expires_at > now);
        before - windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn increment_now(&self, key: &str, window_ms: u64) -> WindowCount {
        let now = self.clock.now_millis();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(key.to_string()).or_insert(MemoryWindow {
            count: 0,
            expires_at: now,
        });
        if window.expires_at <= now {
            window.count = 0;
            window.expires_at = now.saturating_add(window_ms as i64);
        }
        window.count += 1;
        WindowCount {
            count: window.count,
            reset_after_ms: (window.expires_at - now).max(0) as u64,
        }
    }

    fn get_now(&self, key: &str) -> Option<WindowCount> {
        let now = self.clock.now_millis();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match windows.get(key).copied() {
            Some(w) if w.expires_at > now => Some(WindowCount {
                count: w.count,
                reset_after_ms: (w.expires_at - now) as u64,
            }),
            Some(_) => {
                windows.remove(key);
                None
            }
            None => None,
        }
    }

    fn reset_now(&self, key: &str) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<WindowCount, VlvtError> {
        Ok(self.increment_now(key, window_ms))
    }

    async fn get(&self, key: &str) -> Result<Option<WindowCount>, VlvtError> {
        Ok(self.get_now(key))
    }

    async fn reset(&self, key: &str) -> Result<(), VlvtError> {
        self.reset_now(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// INCR, arm the expiry on the first hit (or if it was lost), report the TTL
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// Shared store; the Lua script keeps each increment atomic across instances
pub struct RedisStore {
    conn: ConnectionManager,
    increment: Script,
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn redis_error(err: redis::RedisError) -> VlvtError {
    VlvtError::Redis(err.to_string())
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            increment: Script::new(INCREMENT_SCRIPT),
        }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Failed to create Redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<WindowCount, VlvtError> {
        let mut conn = self.conn.clone();
        let (count, ttl): (u64, i64) = self
            .increment
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(WindowCount {
            count,
            reset_after_ms: ttl.max(0) as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<WindowCount>, VlvtError> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = conn.get(key).await.map_err(redis_error)?;
        let Some(count) = count else {
            return Ok(None);
        };
        let ttl: i64 = conn.pttl(key).await.map_err(redis_error)?;
        Ok(Some(WindowCount {
            count,
            reset_after_ms: ttl.max(0) as u64,
        }))
    }

    async fn reset(&self, key: &str) -> Result<(), VlvtError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(redis_error)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Memory-first store that upgrades to a shared store once one is installed.
///
/// A failing shared store never fails the request: the call is answered from
/// memory and a warning is logged.
#[derive(Debug)]
pub struct FallbackStore {
    memory: MemoryStore,
    shared: RwLock<Option<Arc<dyn CounterStore>>>,
}

impl FallbackStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: MemoryStore::new(clock),
            shared: RwLock::new(None),
        }
    }

    /// Swap in the shared store
    pub fn install(&self, store: Arc<dyn CounterStore>) {
        info!(backend = store.backend(), "Rate limit store upgraded");
        *self.shared.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    fn shared(&self) -> Option<Arc<dyn CounterStore>> {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CounterStore for FallbackStore {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<WindowCount, VlvtError> {
        if let Some(shared) = self.shared() {
            match shared.increment(key, window_ms).await {
                Ok(count) => return Ok(count),
                Err(e) => warn!(key = %key, error = %e, "Shared rate limit store failed, using memory"),
            }
        }
        self.memory.increment(key, window_ms).await
    }

    async fn get(&self, key: &str) -> Result<Option<WindowCount>, VlvtError> {
        if let Some(shared) = self.shared() {
            match shared.get(key).await {
                Ok(count) => return Ok(count),
                Err(e) => warn!(key = %key, error = %e, "Shared rate limit store failed, using memory"),
            }
        }
        self.memory.get(key).await
    }

    async fn reset(&self, key: &str) -> Result<(), VlvtError> {
        if let Some(shared) = self.shared() {
            if let Err(e) = shared.reset(key).await {
                warn!(key = %key, error = %e, "Shared rate limit store reset failed");
            }
        }
        self.memory.reset(key).await
    }

    fn backend(&self) -> &'static str {
        self.shared().map_or("memory", |s| s.backend())
    }
}

/// Connect to Redis in the background and install it once ready.
///
/// Retries every `retry` until connected or shut down.
pub async fn redis_connector(
    store: Arc<FallbackStore>,
    url: String,
    retry: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = RedisStore::connect(&url) => match result {
                Ok(redis) => {
                    store.install(Arc::new(redis));
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, rate limiting stays in memory");
                }
            },
            _ = shutdown.recv() => return,
        }

        tokio::select! {
            _ = tokio::time::sleep(retry) => {}
            _ = shutdown.recv() => return,
        }
    }
}

/// Periodically drop expired in-memory windows
pub async fn memory_sweeper(
    store: Arc<FallbackStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let removed = store.memory().sweep();
                if removed > 0 {
                    debug!(removed, "Swept expired rate limit windows");
                }
            }
            _ = shutdown.recv() => {
                debug!("Rate limit sweeper shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::MockClock;

    /// Shared store that is always down
    #[derive(Debug)]
    pub(crate) struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn increment(&self, _key: &str, _window_ms: u64) -> Result<WindowCount, VlvtError> {
            Err(VlvtError::Redis("connection refused".into()))
        }

        async fn get(&self, _key: &str) -> Result<Option<WindowCount>, VlvtError> {
            Err(VlvtError::Redis("connection refused".into()))
        }

        async fn reset(&self, _key: &str) -> Result<(), VlvtError> {
            Err(VlvtError::Redis("connection refused".into()))
        }

        fn backend(&self) -> &'static str {
            "redis"
        }
    }

    #[tokio::test]
    async fn test_memory_fixed_window() {
        let clock = MockClock::new(1_000);
        let store = MemoryStore::new(Arc::new(clock.clone()));

        let first = store.increment("k", 60_000).await.unwrap();
        assert_eq!(first, WindowCount { count: 1, reset_after_ms: 60_000 });

        clock.advance(10_000);
        let second = store.increment("k", 60_000).await.unwrap();
        assert_eq!(second, WindowCount { count: 2, reset_after_ms: 50_000 });

        clock.advance(50_000);
        let fresh = store.increment("k", 60_000).await.unwrap();
        assert_eq!(fresh.count, 1);
    }

    #[tokio::test]
    async fn test_memory_get_reset_and_sweep() {
        let clock = MockClock::new(0);
        let store = MemoryStore::new(Arc::new(clock.clone()));

        store.increment("a", 1_000).await.unwrap();
        store.increment("b", 5_000).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().map(|w| w.count), Some(1));

        store.reset("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.increment("a", 1_000).await.unwrap();
        clock.advance(2_000);
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("b").await.unwrap().map(|w| w.reset_after_ms), Some(3_000));
    }

    #[tokio::test]
    async fn test_fallback_starts_on_memory() {
        let store = FallbackStore::new(Arc::new(MockClock::new(0)));
        assert_eq!(store.backend(), "memory");
        assert_eq!(store.increment("k", 1_000).await.unwrap().count, 1);
        assert_eq!(store.increment("k", 1_000).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_fallback_degrades_when_shared_fails() {
        let store = FallbackStore::new(Arc::new(MockClock::new(0)));
        store.install(Arc::new(FailingStore));
        assert_eq!(store.backend(), "redis");

        assert_eq!(store.increment("k", 1_000).await.unwrap().count, 1);
        assert_eq!(store.increment("k", 1_000).await.unwrap().count, 2);
        assert_eq!(store.get("k").await.unwrap().map(|w| w.count), Some(2));
        store.reset("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fallback_prefers_healthy_shared_store() {
        let clock = MockClock::new(0);
        let shared = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let store = FallbackStore::new(Arc::new(clock));
        store.install(shared.clone());

        store.increment("k", 1_000).await.unwrap();
        assert_eq!(shared.get("k").await.unwrap().map(|w| w.count), Some(1));
        assert!(store.memory().is_empty());
    }
}
