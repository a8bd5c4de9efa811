use activa_core::search::ListingLimits;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// External identity provider (Supabase GoTrue).
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub provider_url: String,
    pub anon_key: String,
    /// When set, bearer tokens are verified locally instead of via `/auth/v1/user`.
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        let limits = ListingLimits::default();
        Self { default_limit: limits.default_limit, max_limit: limits.max_limit }
    }
}

impl From<&ListingConfig> for ListingLimits {
    fn from(cfg: &ListingConfig) -> Self {
        ListingLimits { default_limit: cfg.default_limit, max_limit: cfg.max_limit }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: 300 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests: 100, window_seconds: 60 }
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_true() -> bool { true }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `ACTIVA__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("ACTIVA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
