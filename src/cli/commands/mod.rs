pub mod cluster;
pub mod route;
pub mod token;

use anyhow::Context;
use std::num::NonZeroUsize;

use crate::config::AppConfig;

/// Configuration the way the server would load it.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let _ = dotenvy::dotenv();
    AppConfig::from_env().context("failed to load configuration")
}

/// Explicit `--shards`, else the configured shard list length.
pub fn shard_count(explicit: Option<usize>) -> anyhow::Result<NonZeroUsize> {
    let count = match explicit {
        Some(count) => count,
        None => load_config()?.shards.len(),
    };
    NonZeroUsize::new(count).context("shard count must be at least 1")
}
