use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use shardgate::app::{app, AppState};
use shardgate::auth::TokenService;
use shardgate::config::AppConfig;
use shardgate::middleware::RoutingPipeline;
use shardgate::sharding::{HealthMonitor, PostgresBackend, RouterSettings, ShardRouter};
use shardgate::tenant::{isolation::with_audit_trail, TenantResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up SHARDS, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing();
    tracing::info!(
        environment = ?config.environment,
        shards = config.shards.len(),
        header_fallback = config.security.allow_header_fallback,
        "Starting shardgate"
    );

    let tokens = TokenService::from_config(&config.security).context("token service")?;
    let backend = PostgresBackend::from_config(&config.database);
    let settings = RouterSettings::from_config(&config.database, &config.health);
    let router = Arc::new(ShardRouter::new(config.shards.clone(), backend, settings).context("shard router")?);

    for shard in router.all_shards() {
        tracing::info!(shard = shard.id, address = %shard.address(), "shard configured");
    }

    let monitor = config
        .health
        .monitor_interval_secs
        .map(|secs| HealthMonitor::spawn(router.clone(), Duration::from_secs(secs)));

    let pipeline = RoutingPipeline::new(
        Arc::new(tokens),
        TenantResolver::new(config.security.allow_header_fallback),
        router.clone(),
    );
    let state = AppState::new(Arc::new(pipeline), monitor.as_ref().map(HealthMonitor::handle));
    let app = app(state, Duration::from_secs(config.server.request_timeout_secs));

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("shardgate listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server")?;

    if let Some(monitor) = monitor {
        monitor.shutdown().await;
    }
    router.close().await;
    tracing::info!("shardgate stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(with_audit_trail(filter)).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
