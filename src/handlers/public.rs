// handlers/public.rs - GET / and GET /health

use axum::extract::State;
use chrono::Utc;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::ApiResponse;
use crate::sharding::ShardBackend;

pub async fn root() -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": "shardgate",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Tenant-aware request routing and database shard resolution",
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "shards": "/shards, /shards/health (public)",
            "context": "/api/context (bearer token or tenant headers)",
            "restaurants": "/api/restaurants/:restaurant_id (bearer token or tenant headers)",
        }
    }))
}

/// GET /health - liveness. Always 200 while the process serves requests; shard state
/// comes from the background monitor's last report when one is running.
pub async fn health<B: ShardBackend>(State(state): State<AppState<B>>) -> ApiResponse<Value> {
    let router = state.pipeline.router();
    let shards = match state.health.as_ref().and_then(|latest| latest.get()) {
        Some(report) => json!({
            "summary": report.summary(),
            "checked_at": report.checked_at,
        }),
        None => json!({ "count": router.shard_count() }),
    };

    ApiResponse::success(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "shards": shards,
    }))
}
