use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::router::{ShardBackend, ShardRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShardHealth {
    pub shard: usize,
    pub host: String,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub shards: BTreeMap<usize, ShardHealth>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub system_healthy: bool,
}

impl HealthReport {
    pub fn summary(&self) -> HealthSummary {
        let count = |status: HealthStatus| self.shards.values().filter(|h| h.status == status).count();
        let unhealthy = count(HealthStatus::Unhealthy);
        HealthSummary {
            total: self.shards.len(),
            healthy: count(HealthStatus::Healthy),
            degraded: count(HealthStatus::Degraded),
            unhealthy,
            system_healthy: unhealthy == 0,
        }
    }

    pub fn status_of(&self, shard: usize) -> Option<HealthStatus> {
        self.shards.get(&shard).map(|h| h.status)
    }
}

impl<B: ShardBackend> ShardRouter<B> {
    /// Check every shard concurrently. Each check runs against the tighter of the
    /// per-shard and overall deadlines, so a hung shard is reported on its own while the
    /// others keep the results they already produced.
    pub async fn health_check_all(&self) -> HealthReport {
        let deadline = self.settings.probe_timeout.min(self.settings.health_timeout);
        let checks = (0..self.shard_count()).map(|shard| self.check_shard(shard, deadline));
        let results = join_all(checks).await;

        HealthReport {
            shards: results.into_iter().map(|h| (h.shard, h)).collect(),
            checked_at: Utc::now(),
        }
    }

    async fn check_shard(&self, shard: usize, deadline: Duration) -> ShardHealth {
        let started = Instant::now();
        let outcome = tokio::time::timeout(deadline, async {
            let pool = self.pool(shard).await?;
            self.backend.ping(shard, &pool).await
        })
        .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(())) => {
                let (status, message) = if elapsed > self.settings.unhealthy_threshold {
                    (HealthStatus::Unhealthy, format!("response time too high: {elapsed:?}"))
                } else if elapsed > self.settings.degraded_threshold {
                    (HealthStatus::Degraded, format!("response time degraded: {elapsed:?}"))
                } else {
                    (HealthStatus::Healthy, "shard is healthy".to_string())
                };
                self.health(shard, status, elapsed, message)
            }
            Ok(Err(e)) => self.unhealthy(shard, elapsed, e.to_string()),
            Err(_) => {
                warn!(shard, ?deadline, "shard health check timed out");
                self.unhealthy(shard, elapsed, format!("health check timed out after {deadline:?}"))
            }
        }
    }

    fn unhealthy(&self, shard: usize, elapsed: Duration, message: String) -> ShardHealth {
        self.health(shard, HealthStatus::Unhealthy, elapsed, message)
    }

    fn health(&self, shard: usize, status: HealthStatus, elapsed: Duration, message: String) -> ShardHealth {
        ShardHealth {
            shard,
            host: self.descriptor(shard).map(|d| d.host.clone()).unwrap_or_default(),
            status,
            latency_ms: elapsed.as_millis() as u64,
            message,
            checked_at: Utc::now(),
        }
    }
}

/// Shared slot holding the most recent report. Cloning shares the slot.
#[derive(Debug, Clone, Default)]
pub struct LatestHealth(Arc<RwLock<Option<HealthReport>>>);

impl LatestHealth {
    pub fn get(&self) -> Option<HealthReport> {
        self.0.read().ok().and_then(|guard| guard.clone())
    }

    fn set(&self, report: HealthReport) {
        if let Ok(mut guard) = self.0.write() {
            *guard = Some(report);
        }
    }
}

/// Background re-probing of all shards, keeping the latest report.
pub struct HealthMonitor {
    latest: LatestHealth,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn spawn<B: ShardBackend>(router: Arc<ShardRouter<B>>, interval: Duration) -> Self {
        let latest = LatestHealth::default();
        let (stop, mut stopped) = watch::channel(false);

        let slot = latest.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!(?interval, shards = router.shard_count(), "shard health monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = router.health_check_all().await;
                        let previous = slot.get();
                        log_transitions(previous.as_ref(), &report);
                        slot.set(report);
                    }
                    _ = stopped.changed() => break,
                }
            }

            info!("shard health monitor stopped");
        });

        Self { latest, stop, task }
    }

    pub fn latest(&self) -> Option<HealthReport> {
        self.latest.get()
    }

    /// Handle for readers that outlive or never own the monitor, such as request handlers.
    pub fn handle(&self) -> LatestHealth {
        self.latest.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

fn log_transitions(previous: Option<&HealthReport>, current: &HealthReport) {
    for (shard, health) in &current.shards {
        let before = previous.and_then(|p| p.status_of(*shard));
        if before == Some(health.status) {
            continue;
        }
        match health.status {
            HealthStatus::Healthy => info!(shard, latency_ms = health.latency_ms, "shard healthy"),
            HealthStatus::Degraded | HealthStatus::Unhealthy => warn!(
                shard,
                status = ?health.status,
                latency_ms = health.latency_ms,
                message = %health.message,
                "shard health changed"
            ),
        }
    }
}
