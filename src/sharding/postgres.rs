use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;

use super::router::{ShardBackend, ShardError};
use crate::config::{DatabaseConfig, ShardDescriptor};

/// sqlx-backed shard pools.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    max_connections: u32,
    min_connections: u32,
    acquire_timeout: Duration,
    idle_timeout: Duration,
}

impl PostgresBackend {
    pub fn from_config(database: &DatabaseConfig) -> Self {
        Self {
            max_connections: database.max_connections,
            min_connections: database.min_connections,
            acquire_timeout: database.acquire_timeout(),
            idle_timeout: database.idle_timeout(),
        }
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Some(self.idle_timeout))
    }
}

pub fn connect_options(shard: &ShardDescriptor) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&shard.host)
        .port(shard.port)
        .username(&shard.user)
        .password(&shard.password)
        .database(&shard.database)
        .application_name("shardgate")
}

#[async_trait]
impl ShardBackend for PostgresBackend {
    type Pool = PgPool;

    /// `connect_with` opens one connection up front, so an unreachable shard fails here.
    async fn connect(&self, shard: &ShardDescriptor) -> Result<PgPool, ShardError> {
        self.pool_options()
            .connect_with(connect_options(shard))
            .await
            .map_err(|e| ShardError::unreachable(shard.id, e))
    }

    /// Bounded by the pool's own `acquire_timeout`; the connection goes straight back.
    async fn acquire(&self, shard: usize, pool: &PgPool) -> Result<(), ShardError> {
        pool.acquire()
            .await
            .map(drop)
            .map_err(|e| ShardError::unreachable(shard, e))
    }

    async fn ping(&self, shard: usize, pool: &PgPool) -> Result<(), ShardError> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(|e| ShardError::unreachable(shard, e))
    }

    async fn close(&self, pool: &PgPool) {
        pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::{RouterSettings, ShardRouter};

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Port 1 on loopback is never a Postgres server.
        let mut shard = ShardDescriptor::local(0, "shard_0");
        shard.host = "127.0.0.1".into();
        shard.port = 1;

        let backend = PostgresBackend {
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(1),
        };
        let settings = RouterSettings {
            connect_timeout: Duration::from_secs(2),
            connect_retries: 0,
            ..RouterSettings::default()
        };
        let router = ShardRouter::new(vec![shard], backend, settings).unwrap();

        let err = router.connection_for(42).await.unwrap_err();
        assert!(matches!(err, ShardError::Unreachable { shard: 0, .. }));
    }
}
