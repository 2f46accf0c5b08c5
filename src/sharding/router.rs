use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::hash;
use crate::config::{DatabaseConfig, HealthConfig, ShardDescriptor};
use crate::tenant::ShardScope;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("Shard {shard} unreachable: {reason}")]
    Unreachable { shard: usize, reason: String },

    #[error("Unknown shard {0}")]
    UnknownShard(usize),

    #[error("No shards configured")]
    NoShards,

    #[error("Shard at position {position} declares id {id}")]
    Misconfigured { position: usize, id: usize },
}

impl ShardError {
    pub fn unreachable(shard: usize, reason: impl ToString) -> Self {
        ShardError::Unreachable {
            shard,
            reason: reason.to_string(),
        }
    }
}

/// Opens and checks connection pools for individual shards.
#[async_trait]
pub trait ShardBackend: Send + Sync + 'static {
    type Pool: Clone + Send + Sync + 'static;

    async fn connect(&self, shard: &ShardDescriptor) -> Result<Self::Pool, ShardError>;

    /// Check one connection out of an open pool and hand it straight back.
    async fn acquire(&self, shard: usize, pool: &Self::Pool) -> Result<(), ShardError>;

    async fn ping(&self, shard: usize, pool: &Self::Pool) -> Result<(), ShardError>;

    async fn close(&self, pool: &Self::Pool);
}

/// A request-scoped handle onto one shard's pool. Holds no connection itself; the pool
/// hands connections out per query and takes them back on drop.
#[derive(Debug, Clone)]
pub struct ShardConnection<P> {
    shard_number: usize,
    pool: P,
}

impl<P> ShardConnection<P> {
    pub fn shard_number(&self) -> usize {
        self.shard_number
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }
}

impl<P> ShardScope for ShardConnection<P> {
    fn shard_number(&self) -> usize {
        self.shard_number
    }
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub retry_backoff: Duration,
    pub acquire_timeout: Duration,
    pub probe_timeout: Duration,
    pub health_timeout: Duration,
    pub degraded_threshold: Duration,
    pub unhealthy_threshold: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            connect_retries: 1,
            retry_backoff: Duration::from_millis(200),
            acquire_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            health_timeout: Duration::from_secs(5),
            degraded_threshold: Duration::from_millis(500),
            unhealthy_threshold: Duration::from_secs(2),
        }
    }
}

impl RouterSettings {
    pub fn from_config(database: &DatabaseConfig, health: &HealthConfig) -> Self {
        Self {
            connect_timeout: database.connect_timeout(),
            connect_retries: database.connect_retries,
            retry_backoff: database.retry_backoff(),
            acquire_timeout: database.acquire_timeout(),
            probe_timeout: Duration::from_millis(health.probe_timeout_ms),
            health_timeout: Duration::from_millis(health.overall_timeout_ms),
            degraded_threshold: Duration::from_millis(health.degraded_threshold_ms),
            unhealthy_threshold: Duration::from_millis(health.unhealthy_threshold_ms),
        }
    }
}

/// Maps restaurants to shards and owns one lazily created pool per shard.
pub struct ShardRouter<B: ShardBackend> {
    shards: Vec<ShardDescriptor>,
    shard_count: NonZeroUsize,
    pools: Vec<OnceCell<B::Pool>>,
    pub(super) backend: B,
    pub(super) settings: RouterSettings,
}

impl<B: ShardBackend> ShardRouter<B> {
    pub fn new(shards: Vec<ShardDescriptor>, backend: B, settings: RouterSettings) -> Result<Self, ShardError> {
        let shard_count = NonZeroUsize::new(shards.len()).ok_or(ShardError::NoShards)?;
        if let Some((position, shard)) = shards.iter().enumerate().find(|(i, s)| s.id != *i) {
            return Err(ShardError::Misconfigured {
                position,
                id: shard.id,
            });
        }

        let pools = shards.iter().map(|_| OnceCell::new()).collect();
        info!(shards = shard_count.get(), "shard router configured");

        Ok(Self {
            shards,
            shard_count,
            pools,
            backend,
            settings,
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count.get()
    }

    pub fn shard_for(&self, restaurant_id: i64) -> usize {
        hash::shard_for(restaurant_id, self.shard_count)
    }

    pub fn all_shards(&self) -> &[ShardDescriptor] {
        &self.shards
    }

    pub fn descriptor(&self, shard: usize) -> Option<&ShardDescriptor> {
        self.shards.get(shard)
    }

    /// Handle onto the pool of the shard owning `restaurant_id`. A failure is reported
    /// as-is; no other shard is ever tried in its place.
    pub async fn connection_for(&self, restaurant_id: i64) -> Result<ShardConnection<B::Pool>, ShardError> {
        let shard = self.shard_for(restaurant_id);
        debug!(restaurant_id, shard, "resolved shard");
        self.connection_for_shard(shard).await
    }

    /// An open pool is not proof the shard is still up, so every handle is preceded by a
    /// checkout that must succeed within `acquire_timeout`.
    pub async fn connection_for_shard(&self, shard: usize) -> Result<ShardConnection<B::Pool>, ShardError> {
        let pool = self.pool(shard).await?;
        match tokio::time::timeout(self.settings.acquire_timeout, self.backend.acquire(shard, &pool)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(shard, error = %e, "shard connection checkout failed");
                return Err(e);
            }
            Err(_) => {
                let e = ShardError::unreachable(
                    shard,
                    format!("connection checkout timed out after {:?}", self.settings.acquire_timeout),
                );
                warn!(shard, error = %e, "shard connection checkout failed");
                return Err(e);
            }
        }
        Ok(ShardConnection {
            shard_number: shard,
            pool,
        })
    }

    /// Initialised at most once per shard. A cancelled or failed initialisation leaves the
    /// slot empty for the next caller.
    pub(super) async fn pool(&self, shard: usize) -> Result<B::Pool, ShardError> {
        let slot = self.pools.get(shard).ok_or(ShardError::UnknownShard(shard))?;
        slot.get_or_try_init(|| self.open(shard)).await.cloned()
    }

    async fn open(&self, shard: usize) -> Result<B::Pool, ShardError> {
        let descriptor = &self.shards[shard];
        let attempts = self.settings.connect_retries + 1;
        let mut last_error = ShardError::unreachable(shard, "no connection attempt made");

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.settings.connect_timeout, self.backend.connect(descriptor)).await {
                Ok(Ok(pool)) => {
                    info!(shard, address = %descriptor.address(), attempt, "opened shard pool");
                    return Ok(pool);
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = ShardError::unreachable(
                        shard,
                        format!("connect timed out after {:?}", self.settings.connect_timeout),
                    )
                }
            }

            warn!(shard, attempt, attempts, error = %last_error, "shard connect attempt failed");
            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_backoff).await;
            }
        }

        Err(last_error)
    }

    /// Close every pool opened so far.
    pub async fn close(&self) {
        for (shard, slot) in self.pools.iter().enumerate() {
            if let Some(pool) = slot.get() {
                self.backend.close(pool).await;
                info!(shard, "closed shard pool");
            }
        }
    }
}
