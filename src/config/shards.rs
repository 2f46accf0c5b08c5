use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

use super::{ConfigError, Environment};

/// Connection details for one shard. Loaded once at startup and never mutated.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub id: usize,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    pub database: String,
}

fn default_port() -> u16 {
    5432
}

impl ShardDescriptor {
    /// A shard on the local Postgres with default credentials.
    pub fn local(id: usize, database: impl Into<String>) -> Self {
        Self {
            id,
            host: "localhost".to_string(),
            port: default_port(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: database.into(),
        }
    }

    /// `host:port/database`, safe to log.
    pub fn address(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ShardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardDescriptor")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Load the shard list: `SHARDS_FILE` (YAML or JSON) wins over inline `SHARDS` (JSON).
/// Development falls back to a single local shard.
pub fn load_from_env(environment: Environment) -> Result<Vec<ShardDescriptor>, ConfigError> {
    if let Ok(path) = env::var("SHARDS_FILE") {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::ShardFile {
            path: path.clone(),
            source,
        })?;
        return parse(&raw);
    }

    if let Ok(raw) = env::var("SHARDS") {
        return parse(&raw);
    }

    match environment {
        Environment::Development => Ok(vec![ShardDescriptor::local(0, "shard_0")]),
        _ => Err(ConfigError::NoShards),
    }
}

/// JSON is a subset of YAML, so one parser covers both file formats.
pub fn parse(raw: &str) -> Result<Vec<ShardDescriptor>, ConfigError> {
    let shards: Vec<ShardDescriptor> = serde_yaml::from_str(raw)?;
    validate(&shards)?;
    Ok(shards)
}

/// The shard number handed out by the router is the position in this list, so ids must
/// line up with positions.
pub fn validate(shards: &[ShardDescriptor]) -> Result<(), ConfigError> {
    if shards.is_empty() {
        return Err(ConfigError::NoShards);
    }

    for (position, shard) in shards.iter().enumerate() {
        if shard.id != position {
            return Err(ConfigError::ShardOrder {
                position,
                id: shard.id,
            });
        }
        if shard.host.trim().is_empty() {
            return Err(ConfigError::IncompleteShard(shard.id, "host"));
        }
        if shard.port == 0 {
            return Err(ConfigError::IncompleteShard(shard.id, "port"));
        }
        if shard.database.trim().is_empty() {
            return Err(ConfigError::IncompleteShard(shard.id, "database"));
        }
    }

    Ok(())
}
