pub mod shards;

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub use shards::ShardDescriptor;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("No shards configured")]
    NoShards,

    #[error("Shard at position {position} declares id {id}; ids must be 0..n in order")]
    ShardOrder { position: usize, id: usize },

    #[error("Shard {0} is incomplete: {1}")]
    IncompleteShard(usize, &'static str),

    #[error("Failed to read shard file {path}: {source}")]
    ShardFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse shard list: {0}")]
    ShardParse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub health: HealthConfig,
    pub shards: Vec<ShardDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

/// Per-shard pool settings. Every shard gets its own pool built from these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub connect_retries: u32,
    pub retry_backoff_ms: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub jwt_issuer: Option<String>,
    pub jwt_leeway_secs: u64,
    /// Accept `X-Tenant-ID` / `X-Restaurant-ID` from callers without a bearer token.
    pub allow_header_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub probe_timeout_ms: u64,
    pub overall_timeout_ms: u64,
    pub degraded_threshold_ms: u64,
    pub unhealthy_threshold_ms: u64,
    pub monitor_interval_secs: Option<u64>,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        let mut config = match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()?;

        config.shards = shards::load_from_env(environment)?;
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        // Server overrides
        if let Some(v) = env::var("SHARDGATE_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = parse_var("PORT", &v)?;
        }
        override_var("REQUEST_TIMEOUT_SECS", &mut self.server.request_timeout_secs)?;

        // Database overrides
        override_var("DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections)?;
        override_var("DATABASE_MIN_CONNECTIONS", &mut self.database.min_connections)?;
        override_var("DATABASE_ACQUIRE_TIMEOUT_MS", &mut self.database.acquire_timeout_ms)?;
        override_var("DATABASE_CONNECT_TIMEOUT_MS", &mut self.database.connect_timeout_ms)?;
        override_var("DATABASE_CONNECT_RETRIES", &mut self.database.connect_retries)?;
        override_var("DATABASE_RETRY_BACKOFF_MS", &mut self.database.retry_backoff_ms)?;
        override_var("DATABASE_IDLE_TIMEOUT_SECS", &mut self.database.idle_timeout_secs)?;

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        override_var("JWT_EXPIRY_HOURS", &mut self.security.jwt_expiry_hours)?;
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.jwt_issuer = Some(v).filter(|s| !s.trim().is_empty());
        }
        override_var("JWT_LEEWAY_SECS", &mut self.security.jwt_leeway_secs)?;
        override_var("TENANT_HEADER_FALLBACK", &mut self.security.allow_header_fallback)?;

        // Health overrides
        override_var("HEALTH_PROBE_TIMEOUT_MS", &mut self.health.probe_timeout_ms)?;
        override_var("HEALTH_TIMEOUT_MS", &mut self.health.overall_timeout_ms)?;
        override_var("HEALTH_DEGRADED_MS", &mut self.health.degraded_threshold_ms)?;
        override_var("HEALTH_UNHEALTHY_MS", &mut self.health.unhealthy_threshold_ms)?;
        if let Ok(v) = env::var("HEALTH_MONITOR_INTERVAL_SECS") {
            let secs: u64 = parse_var("HEALTH_MONITOR_INTERVAL_SECS", &v)?;
            self.health.monitor_interval_secs = (secs > 0).then_some(secs);
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Development && self.security.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }

        let security = &self.security;
        if !(1..=MAX_JWT_EXPIRY_HOURS).contains(&security.jwt_expiry_hours) {
            return Err(invalid("JWT_EXPIRY_HOURS", security.jwt_expiry_hours));
        }
        if security.jwt_leeway_secs > MAX_JWT_LEEWAY_SECS {
            return Err(invalid("JWT_LEEWAY_SECS", security.jwt_leeway_secs));
        }

        // Each shard's deadline must fit inside the whole check
        let health = &self.health;
        if health.probe_timeout_ms == 0 || health.probe_timeout_ms >= health.overall_timeout_ms {
            return Err(invalid(
                "HEALTH_PROBE_TIMEOUT_MS",
                format!("{} (must be below HEALTH_TIMEOUT_MS={})", health.probe_timeout_ms, health.overall_timeout_ms),
            ));
        }
        if health.degraded_threshold_ms > health.unhealthy_threshold_ms {
            return Err(invalid(
                "HEALTH_DEGRADED_MS",
                format!(
                    "{} (must not exceed HEALTH_UNHEALTHY_MS={})",
                    health.degraded_threshold_ms, health.unhealthy_threshold_ms
                ),
            ));
        }

        shards::validate(&self.shards)
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                max_connections: 10,
                min_connections: 0,
                acquire_timeout_ms: 5_000,
                connect_timeout_ms: 5_000,
                connect_retries: 1,
                retry_backoff_ms: 200,
                idle_timeout_secs: 600,
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret".to_string(),
                jwt_expiry_hours: 24,
                jwt_issuer: None,
                jwt_leeway_secs: 30,
                allow_header_fallback: true,
            },
            health: HealthConfig {
                probe_timeout_ms: 2_000,
                overall_timeout_ms: 5_000,
                degraded_threshold_ms: 500,
                unhealthy_threshold_ms: 2_000,
                monitor_interval_secs: None,
            },
            shards: Vec::new(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                request_timeout_secs: 15,
            },
            database: DatabaseConfig {
                max_connections: 20,
                min_connections: 1,
                acquire_timeout_ms: 3_000,
                connect_timeout_ms: 3_000,
                connect_retries: 2,
                retry_backoff_ms: 250,
                idle_timeout_secs: 300,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 8,
                jwt_issuer: None,
                jwt_leeway_secs: 10,
                allow_header_fallback: true,
            },
            health: HealthConfig {
                probe_timeout_ms: 2_000,
                overall_timeout_ms: 5_000,
                degraded_threshold_ms: 500,
                unhealthy_threshold_ms: 2_000,
                monitor_interval_secs: Some(30),
            },
            shards: Vec::new(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8080,
                request_timeout_secs: 10,
            },
            database: DatabaseConfig {
                max_connections: 50,
                min_connections: 2,
                acquire_timeout_ms: 2_000,
                connect_timeout_ms: 2_000,
                connect_retries: 2,
                retry_backoff_ms: 250,
                idle_timeout_secs: 300,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                jwt_issuer: None,
                jwt_leeway_secs: 5,
                allow_header_fallback: false,
            },
            health: HealthConfig {
                probe_timeout_ms: 1_000,
                overall_timeout_ms: 3_000,
                degraded_threshold_ms: 500,
                unhealthy_threshold_ms: 2_000,
                monitor_interval_secs: Some(15),
            },
            shards: Vec::new(),
        }
    }
}

/// One year.
pub const MAX_JWT_EXPIRY_HOURS: u64 = 24 * 365;
pub const MAX_JWT_LEEWAY_SECS: u64 = 3_600;

fn invalid(name: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn override_var<T: std::str::FromStr>(name: &'static str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(v) = env::var(name) {
        *target = parse_var(name, &v)?;
    }
    Ok(())
}
