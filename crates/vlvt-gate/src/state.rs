//! Application state and shared resources.

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::http::HeaderName;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::after_hours::AfterHoursGate;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::csrf::{CookieOptions, CsrfProtection};
use crate::db::QueryExecutor;
use crate::exemptions::PathRules;
use crate::ratelimit::{EventLimit, FallbackStore, RateLimiters, default_event_limits};
use crate::signing::{SignatureGuard, SignatureScheme, SignatureVerifier, VerifierSettings};

/// Shared application state, built once at startup
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Client → service signatures
    pub client_signatures: SignatureGuard,

    /// Service → service signatures
    pub internal_signatures: SignatureGuard,

    pub csrf: Arc<CsrfProtection>,

    /// Per-route HTTP limiters over `store`
    pub limiters: RateLimiters,

    /// Counter store (memory until Redis is installed)
    pub store: Arc<FallbackStore>,

    /// Socket event budgets handed to each connection's limiter
    pub event_limits: Arc<HashMap<String, EventLimit>>,

    pub after_hours: Arc<AfterHoursGate>,

    pub db: Arc<dyn QueryExecutor>,

    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Build every guard from configuration. Fails on missing production secrets.
    pub fn new(config: AppConfig, db: Arc<dyn QueryExecutor>, clock: Arc<dyn Clock>) -> Result<Self> {
        let secrets = config
            .resolve_secrets()
            .context("Failed to resolve signing secrets")?;

        let client_verifier = SignatureVerifier::new(
            SignatureScheme::client(),
            secrets.signing.as_bytes(),
            VerifierSettings {
                tolerance_ms: config.signing.tolerance_ms,
                skip_paths: PathRules::new(config.signing.skip_paths.iter().cloned()),
                skip_safe_methods: config.signing.skip_safe_methods,
            },
            clock.clone(),
        );
        let internal_verifier = SignatureVerifier::internal(
            secrets.internal.as_bytes(),
            config.internal_tolerance_ms(),
            clock.clone(),
        );

        let csrf = CsrfProtection {
            cookie_name: config.csrf.cookie_name.clone(),
            header_name: HeaderName::try_from(config.csrf.header_name.as_str())
                .context("Invalid CSRF header name")?,
            token_bytes: config.csrf.token_bytes,
            skip_paths: PathRules::new(config.csrf.skip_paths.iter().cloned()),
            cookie: CookieOptions {
                same_site: config.csrf.same_site,
                secure: config.csrf_secure(),
                max_age_secs: config.csrf.max_age_secs,
                path: config.csrf.cookie_path.clone(),
            },
        };

        let store = Arc::new(FallbackStore::new(clock.clone()));
        let limiters = RateLimiters::new(&config.rate_limit.routes, store.clone(), config.trust_proxy);

        let mut event_limits = default_event_limits();
        event_limits.extend(config.rate_limit.events.iter().map(|(k, v)| (k.clone(), *v)));

        info!(
            routes = limiters.len(),
            events = event_limits.len(),
            "Rate limit policies loaded"
        );

        let after_hours = Arc::new(AfterHoursGate::new(db.clone(), clock.clone()));
        let max_body_bytes = config.signing.max_body_bytes;

        Ok(Self {
            config: Arc::new(config),
            client_signatures: SignatureGuard::new(client_verifier, max_body_bytes),
            internal_signatures: SignatureGuard::new(internal_verifier, max_body_bytes),
            csrf: Arc::new(csrf),
            limiters,
            store,
            event_limits: Arc::new(event_limits),
            after_hours,
            db,
            clock,
        })
    }
}

impl FromRef<AppState> for Arc<CsrfProtection> {
    fn from_ref(state: &AppState) -> Self {
        state.csrf.clone()
    }
}
