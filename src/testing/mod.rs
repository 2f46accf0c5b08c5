//! In-memory stand-ins for shard databases and token plumbing used by unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{FixedClock, TokenService, TokenSettings, TokenSubject};
use crate::config::ShardDescriptor;
use crate::sharding::{ShardBackend, ShardError};

pub const TEST_SECRET: &[u8] = b"test-signing-secret";
pub const TEST_NOW: i64 = 1_700_000_000;

/// A "pool" is just an identity: which shard it belongs to and which open produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakePool {
    pub shard: usize,
    pub id: u64,
}

#[derive(Default)]
struct FakeState {
    unreachable: HashSet<usize>,
    attempts: HashMap<usize, usize>,
    connects: HashMap<usize, usize>,
    ping_delays: HashMap<usize, Duration>,
    acquire_delays: HashMap<usize, Duration>,
    closed: Vec<usize>,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    next_id: Arc<AtomicU64>,
    connect_delay: Option<Duration>,
}

impl FakeBackend {
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn set_unreachable(&self, shard: usize, unreachable: bool) {
        let mut state = self.state.lock().unwrap();
        if unreachable {
            state.unreachable.insert(shard);
        } else {
            state.unreachable.remove(&shard);
        }
    }

    pub fn set_ping_delay(&self, shard: usize, delay: Duration) {
        self.state.lock().unwrap().ping_delays.insert(shard, delay);
    }

    pub fn set_acquire_delay(&self, shard: usize, delay: Duration) {
        self.state.lock().unwrap().acquire_delays.insert(shard, delay);
    }

    /// Connect calls, successful or not.
    pub fn attempts(&self, shard: usize) -> usize {
        self.state.lock().unwrap().attempts.get(&shard).copied().unwrap_or(0)
    }

    /// Pools actually opened.
    pub fn connects(&self, shard: usize) -> usize {
        self.state.lock().unwrap().connects.get(&shard).copied().unwrap_or(0)
    }

    pub fn closed(&self) -> Vec<usize> {
        self.state.lock().unwrap().closed.clone()
    }

    fn is_unreachable(&self, shard: usize) -> bool {
        self.state.lock().unwrap().unreachable.contains(&shard)
    }
}

#[async_trait]
impl ShardBackend for FakeBackend {
    type Pool = FakePool;

    async fn connect(&self, shard: &ShardDescriptor) -> Result<FakePool, ShardError> {
        *self.state.lock().unwrap().attempts.entry(shard.id).or_default() += 1;

        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_unreachable(shard.id) {
            return Err(ShardError::unreachable(shard.id, "connection refused"));
        }

        *self.state.lock().unwrap().connects.entry(shard.id).or_default() += 1;
        Ok(FakePool {
            shard: shard.id,
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn acquire(&self, shard: usize, _pool: &FakePool) -> Result<(), ShardError> {
        let delay = self.state.lock().unwrap().acquire_delays.get(&shard).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_unreachable(shard) {
            return Err(ShardError::unreachable(shard, "no connection available"));
        }
        Ok(())
    }

    async fn ping(&self, shard: usize, _pool: &FakePool) -> Result<(), ShardError> {
        let delay = self.state.lock().unwrap().ping_delays.get(&shard).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_unreachable(shard) {
            return Err(ShardError::unreachable(shard, "ping failed"));
        }
        Ok(())
    }

    async fn close(&self, pool: &FakePool) {
        self.state.lock().unwrap().closed.push(pool.shard);
    }
}

pub fn test_shards(count: usize) -> Vec<ShardDescriptor> {
    (0..count)
        .map(|id| ShardDescriptor {
            id,
            host: format!("shard{id}.example.com"),
            port: 5432,
            user: "postgres".to_string(),
            password: "password".to_string(),
            database: format!("shard{id}_db"),
        })
        .collect()
}

pub fn test_tokens() -> TokenService {
    TokenService::new(TEST_SECRET, TokenSettings::default())
        .expect("test secret is non-empty")
        .with_clock(Arc::new(FixedClock(
            Utc.timestamp_opt(TEST_NOW, 0).single().expect("valid timestamp"),
        )))
}

pub fn subject(tenant_id: i64, restaurant_id: Option<i64>) -> TokenSubject {
    TokenSubject {
        user_id: 7,
        email: "owner@example.com".to_string(),
        tenant_id,
        restaurant_id,
        role: "owner".to_string(),
    }
}
