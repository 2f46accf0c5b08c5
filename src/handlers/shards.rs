// handlers/shards.rs - shard topology and live health

use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::app::AppState;
use crate::config::ShardDescriptor;
use crate::middleware::ApiResponse;
use crate::sharding::{HealthSummary, ShardBackend, ShardHealth};

#[derive(Debug, Serialize)]
pub struct ShardListing {
    pub count: usize,
    pub shards: Vec<ShardDescriptor>,
}

/// GET /shards - every configured shard. Passwords are never serialized.
pub async fn shard_list<B: ShardBackend>(State(state): State<AppState<B>>) -> ApiResponse<ShardListing> {
    let router = state.pipeline.router();
    ApiResponse::success(ShardListing {
        count: router.shard_count(),
        shards: router.all_shards().to_vec(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub summary: HealthSummary,
    pub shards: BTreeMap<usize, ShardHealth>,
    pub checked_at: DateTime<Utc>,
}

/// GET /shards/health - checks every shard now. 503 unless all shards are healthy, so
/// load balancers can act on the status alone.
pub async fn shard_health<B: ShardBackend>(State(state): State<AppState<B>>) -> ApiResponse<HealthView> {
    let report = state.pipeline.router().health_check_all().await;
    let summary = report.summary();

    let status = if summary.healthy == summary.total {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    ApiResponse::with_status(
        HealthView {
            summary,
            shards: report.shards,
            checked_at: report.checked_at,
        },
        status,
    )
}
