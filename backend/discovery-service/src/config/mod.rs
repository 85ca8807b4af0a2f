//! Configuration management for Discovery Service
//!
//! Loads configuration from environment variables.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub scoring: ScoringConfig,
    pub discovery: DiscoveryConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    pub http_port: u16,
}

/// Database configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// New connection to PostgreSQL, also bounds the start-up `SELECT 1`
    pub connect_timeout_secs: u64,
    /// Getting a connection from the pool
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub run_migrations: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

/// Scoring weights and decay constants
///
/// Immutable once loaded; shared by the tracker, the synthesizer and the
/// compositor. Pairs (`category`/`freshness`, `explicit`/`implicit`) are
/// expected to sum to 1, which is logged rather than enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScoringConfig {
    #[validate(range(min = 0.0))]
    pub category_weight: f64,
    #[validate(range(min = 0.0))]
    pub freshness_weight: f64,
    #[validate(range(min = 0.0))]
    pub explicit_weight: f64,
    #[validate(range(min = 0.0))]
    pub implicit_weight: f64,
    /// A like counts this many views
    #[validate(range(min = 0.0))]
    pub like_multiplier: f64,
    #[validate(range(min = 0.0))]
    pub view_increment: f64,
    /// Decay rate per day
    #[validate(range(min = 0.0))]
    pub time_decay_lambda: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            category_weight: 0.6,
            freshness_weight: 0.4,
            explicit_weight: 0.4,
            implicit_weight: 0.6,
            like_multiplier: 5.0,
            view_increment: 1.0,
            time_decay_lambda: 0.1,
        }
    }
}

impl ScoringConfig {
    pub fn like_increment(&self) -> f64 {
        self.view_increment * self.like_multiplier
    }

    /// Range validation plus a finiteness check (`range` lets NaN through)
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| anyhow!("invalid scoring configuration: {}", e))?;

        let values = [
            ("category_weight", self.category_weight),
            ("freshness_weight", self.freshness_weight),
            ("explicit_weight", self.explicit_weight),
            ("implicit_weight", self.implicit_weight),
            ("like_multiplier", self.like_multiplier),
            ("view_increment", self.view_increment),
            ("time_decay_lambda", self.time_decay_lambda),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(anyhow!("invalid scoring configuration: {} = {}", name, value));
        }

        Ok(())
    }

    /// Log pairs that do not sum to 1
    pub fn warn_on_unbalanced_weights(&self) {
        let blend = self.category_weight + self.freshness_weight;
        if (blend - 1.0).abs() > 1e-6 {
            warn!(
                category_weight = self.category_weight,
                freshness_weight = self.freshness_weight,
                "category and freshness weights do not sum to 1"
            );
        }

        let affinity = self.explicit_weight + self.implicit_weight;
        if (affinity - 1.0).abs() > 1e-6 {
            warn!(
                explicit_weight = self.explicit_weight,
                implicit_weight = self.implicit_weight,
                "explicit and implicit weights do not sum to 1"
            );
        }
    }
}

/// Discovery request limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct DiscoveryConfig {
    /// Budget for page + count together
    #[validate(range(min = 1, max = 60000))]
    pub query_timeout_ms: u64,
    #[validate(range(min = 1, max = 1000))]
    pub max_page_size: u32,
    /// Stored preference embeddings older than this are re-synthesized on read
    pub preference_staleness_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 3000,
            max_page_size: 100,
            preference_staleness_secs: 86_400,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("HTTP_PORT", 8090)?,
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
            min_connections: env_or("DB_MIN_CONNECTIONS", 2)?,
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 5)?,
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 10)?,
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 600)?,
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800)?,
            run_migrations: env_or("RUN_MIGRATIONS", true)?,
        };

        let defaults = ScoringConfig::default();
        let scoring = ScoringConfig {
            category_weight: env_or("RECOMMENDATION_WEIGHT_CATEGORY", defaults.category_weight)?,
            freshness_weight: env_or(
                "RECOMMENDATION_WEIGHT_FRESHNESS",
                defaults.freshness_weight,
            )?,
            explicit_weight: env_or("RECOMMENDATION_WEIGHT_EXPLICIT", defaults.explicit_weight)?,
            implicit_weight: env_or("RECOMMENDATION_WEIGHT_IMPLICIT", defaults.implicit_weight)?,
            like_multiplier: env_or("RECOMMENDATION_LIKE_MULTIPLIER", defaults.like_multiplier)?,
            view_increment: env_or("RECOMMENDATION_VIEW_INCREMENT", defaults.view_increment)?,
            time_decay_lambda: env_or(
                "RECOMMENDATION_TIME_DECAY_LAMBDA",
                defaults.time_decay_lambda,
            )?,
        };
        scoring.check()?;
        scoring.warn_on_unbalanced_weights();

        let limits = DiscoveryConfig::default();
        let discovery = DiscoveryConfig {
            query_timeout_ms: env_or("DISCOVERY_QUERY_TIMEOUT_MS", limits.query_timeout_ms)?,
            max_page_size: env_or("DISCOVERY_MAX_PAGE_SIZE", limits.max_page_size)?,
            preference_staleness_secs: env_or(
                "PREFERENCE_STALENESS_SECS",
                limits.preference_staleness_secs,
            )?,
        };
        discovery
            .validate()
            .map_err(|e| anyhow!("invalid discovery configuration: {}", e))?;

        Ok(Config {
            app,
            database,
            scoring,
            discovery,
        })
    }
}

/// Read `key`, falling back to `default` when unset; a present but unparsable value is an error
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{} has invalid value {:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
