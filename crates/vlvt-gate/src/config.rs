//! Configuration management for the gate.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use vlvt_common::VlvtError;
use vlvt_common::constants::{
    DEFAULT_CSRF_MAX_AGE_SECS, DEFAULT_CSRF_TOKEN_BYTES, DEFAULT_DATABASE_PATH,
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_SIGNED_BODY_BYTES, DEFAULT_REDIS_URL,
    DEFAULT_TIMESTAMP_TOLERANCE_MS, DEV_SIGNING_SECRET, MEMORY_STORE_SWEEP_INTERVAL_SECS,
    PRODUCTION_ENV, cookies, headers,
};

use crate::csrf::SameSite;
use crate::ratelimit::{EventLimit, RoutePolicy};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Deployment environment; `production` refuses to start without secrets
    #[serde(default = "default_environment")]
    pub environment: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Redis URL for shared rate limit counters; empty keeps counters in memory
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// SQLite database holding users and subscriptions
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Honour `X-Forwarded-For` (only behind a trusted reverse proxy)
    #[serde(default)]
    pub trust_proxy: bool,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub internal: InternalConfig,

    #[serde(default)]
    pub csrf: CsrfConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Client request signing
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Shared HMAC secret (prefer `REQUEST_SIGNING_SECRET`)
    #[serde(default)]
    pub secret: Option<String>,

    /// Accepted clock skew, either direction
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: i64,

    #[serde(default = "default_signing_skip_paths")]
    pub skip_paths: Vec<String>,

    #[serde(default = "default_true")]
    pub skip_safe_methods: bool,

    /// Largest body buffered for verification
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_ms: default_tolerance_ms(),
            skip_paths: default_signing_skip_paths(),
            skip_safe_methods: true,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Service-to-service authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InternalConfig {
    /// Falls back to the signing secret when unset
    #[serde(default)]
    pub secret: Option<String>,

    /// Falls back to the signing tolerance when unset
    #[serde(default)]
    pub tolerance_ms: Option<i64>,
}

/// Double-submit CSRF protection
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfConfig {
    #[serde(default = "default_csrf_cookie")]
    pub cookie_name: String,

    #[serde(default = "default_csrf_header")]
    pub header_name: String,

    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,

    #[serde(default = "default_csrf_skip_paths")]
    pub skip_paths: Vec<String>,

    #[serde(default = "default_same_site")]
    pub same_site: SameSite,

    /// Defaults to on in production
    #[serde(default)]
    pub secure: Option<bool>,

    #[serde(default = "default_csrf_max_age")]
    pub max_age_secs: u64,

    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_csrf_cookie(),
            header_name: default_csrf_header(),
            token_bytes: default_token_bytes(),
            skip_paths: default_csrf_skip_paths(),
            same_site: default_same_site(),
            secure: None,
            max_age_secs: default_csrf_max_age(),
            cookie_path: default_cookie_path(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Route group budgets, overlaid on the built-in ones
    #[serde(default)]
    pub routes: HashMap<String, RoutePolicy>,

    /// Socket event budgets, overlaid on the built-in ones
    #[serde(default)]
    pub events: HashMap<String, EventLimit>,

    /// Log socket limit violations
    #[serde(default = "default_true")]
    pub log_violations: bool,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Delay between Redis connection attempts
    #[serde(default = "default_redis_retry")]
    pub redis_retry_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            events: HashMap::new(),
            log_violations: true,
            sweep_interval_secs: default_sweep_interval(),
            redis_retry_secs: default_redis_retry(),
        }
    }
}

/// Secrets resolved once at startup
#[derive(Clone)]
pub struct Secrets {
    pub signing: String,
    pub internal: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secrets(..)")
    }
}

// Default value functions
fn default_environment() -> String { "development".to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_database_path() -> String { DEFAULT_DATABASE_PATH.to_string() }
fn default_tolerance_ms() -> i64 { DEFAULT_TIMESTAMP_TOLERANCE_MS }
fn default_max_body_bytes() -> usize { DEFAULT_MAX_SIGNED_BODY_BYTES }
fn default_signing_skip_paths() -> Vec<String> { vec!["/health".to_string(), "/ready".to_string()] }
fn default_csrf_skip_paths() -> Vec<String> { vec!["/internal".to_string()] }
fn default_csrf_cookie() -> String { cookies::CSRF_TOKEN.to_string() }
fn default_csrf_header() -> String { headers::X_CSRF_TOKEN.to_string() }
fn default_token_bytes() -> usize { DEFAULT_CSRF_TOKEN_BYTES }
fn default_same_site() -> SameSite { SameSite::Strict }
fn default_csrf_max_age() -> u64 { DEFAULT_CSRF_MAX_AGE_SECS }
fn default_cookie_path() -> String { "/".to_string() }
fn default_sweep_interval() -> u64 { MEMORY_STORE_SWEEP_INTERVAL_SECS }
fn default_redis_retry() -> u64 { 5 }
fn default_true() -> bool { true }

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AppConfig {
    /// Load configuration from file, with CLI/environment overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            warn!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(args);
        Ok(config)
    }

    fn apply_overrides(&mut self, args: &super::Args) {
        if let Some(ref environment) = args.environment {
            self.environment = environment.clone();
        }
        if let Some(ref listen) = args.listen {
            self.listen_addr = listen.clone();
        }
        if let Some(ref redis_url) = args.redis_url {
            self.redis_url = redis_url.clone();
        }
        if let Some(ref database) = args.database {
            self.database_path = database.clone();
        }
        if args.signing_secret.is_some() {
            self.signing.secret = args.signing_secret.clone();
        }
        if args.internal_secret.is_some() {
            self.internal.secret = args.internal_secret.clone();
        }
        if let Some(tolerance) = args.tolerance_ms {
            self.signing.tolerance_ms = tolerance;
        }
        if args.trust_proxy {
            self.trust_proxy = true;
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case(PRODUCTION_ENV)
    }

    /// Signing and internal secrets.
    ///
    /// Production without a signing secret is an error; other environments
    /// get the development secret and a warning.
    pub fn resolve_secrets(&self) -> Result<Secrets, VlvtError> {
        let signing = match non_empty(&self.signing.secret) {
            Some(secret) => secret.to_string(),
            None if self.is_production() => {
                return Err(VlvtError::Config(
                    "REQUEST_SIGNING_SECRET must be set in production".to_string(),
                ));
            }
            None => {
                warn!(
                    environment = %self.environment,
                    "REQUEST_SIGNING_SECRET not set, using the development secret"
                );
                DEV_SIGNING_SECRET.to_string()
            }
        };

        let internal = non_empty(&self.internal.secret)
            .map(str::to_string)
            .unwrap_or_else(|| signing.clone());

        Ok(Secrets { signing, internal })
    }

    pub fn internal_tolerance_ms(&self) -> i64 {
        self.internal
            .tolerance_ms
            .unwrap_or(self.signing.tolerance_ms)
    }

    /// CSRF cookies are `Secure` in production unless configured otherwise
    pub fn csrf_secure(&self) -> bool {
        self.csrf.secure.unwrap_or_else(|| self.is_production())
    }

    /// Redis URL, if shared counters are configured
    pub fn redis_url(&self) -> Option<&str> {
        Some(self.redis_url.trim()).filter(|url| !url.is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            listen_addr: default_listen_addr(),
            redis_url: default_redis_url(),
            database_path: default_database_path(),
            trust_proxy: false,
            signing: SigningConfig::default(),
            internal: InternalConfig::default(),
            csrf: CsrfConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
