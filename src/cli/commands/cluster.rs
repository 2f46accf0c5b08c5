use anyhow::{bail, Context};

use super::load_config;
use crate::cli::utils::{output, output_error};
use crate::cli::OutputFormat;
use crate::sharding::{HealthStatus, PostgresBackend, RouterSettings, ShardRouter};

pub fn shards(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;

    output(output_format, &config.shards, || {
        println!("{:>5}  {:<32}  {:<12}  DATABASE", "SHARD", "HOST", "USER");
        for shard in &config.shards {
            println!(
                "{:>5}  {:<32}  {:<12}  {}",
                shard.id,
                format!("{}:{}", shard.host, shard.port),
                shard.user,
                shard.database
            );
        }
    })
}

/// Probes every shard once. Fails when any shard is unhealthy so scripts can use the exit code.
pub async fn health(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config()?;
    let router = ShardRouter::new(
        config.shards.clone(),
        PostgresBackend::from_config(&config.database),
        RouterSettings::from_config(&config.database, &config.health),
    )
    .context("invalid shard configuration")?;

    let report = router.health_check_all().await;
    router.close().await;
    let summary = report.summary();

    output(output_format, &report, || {
        for health in report.shards.values() {
            let marker = match health.status {
                HealthStatus::Healthy => "✓",
                HealthStatus::Degraded => "~",
                HealthStatus::Unhealthy => "✗",
            };
            println!(
                "{} shard {:>3}  {:<28} {:>6}ms  {}",
                marker, health.shard, health.host, health.latency_ms, health.message
            );
        }
        println!(
            "{} healthy, {} degraded, {} unhealthy of {}",
            summary.healthy, summary.degraded, summary.unhealthy, summary.total
        );
    })?;

    if !summary.system_healthy {
        output_error(output_format, "one or more shards are unhealthy")?;
        bail!("{} of {} shards unhealthy", summary.unhealthy, summary.total);
    }
    Ok(())
}
