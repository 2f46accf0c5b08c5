use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::handlers;
use crate::middleware::{shard_routing_middleware, RoutingPipeline};
use crate::sharding::{LatestHealth, PostgresBackend, ShardBackend};

/// Shared handler state. `health` is present when the background monitor runs.
pub struct AppState<B: ShardBackend> {
    pub pipeline: Arc<RoutingPipeline<B>>,
    pub health: Option<LatestHealth>,
}

impl<B: ShardBackend> AppState<B> {
    pub fn new(pipeline: Arc<RoutingPipeline<B>>, health: Option<LatestHealth>) -> Self {
        Self { pipeline, health }
    }
}

// Manual impl: B itself need not be Clone.
impl<B: ShardBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            health: self.health.clone(),
        }
    }
}

/// Tenant-scoped routes that work against any shard backend.
pub fn api_routes<B: ShardBackend>() -> Router<AppState<B>> {
    Router::new().route("/api/context", get(handlers::routing_context::<B::Pool>))
}

/// Public routes plus `api` behind the shard routing middleware.
pub fn assemble<B: ShardBackend>(
    state: AppState<B>,
    api: Router<AppState<B>>,
    request_timeout: Duration,
) -> Router {
    let api = api.route_layer(from_fn_with_state(state.pipeline.clone(), shard_routing_middleware::<B>));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health::<B>))
        .route("/shards", get(handlers::shard_list::<B>))
        .route("/shards/health", get(handlers::shard_health::<B>))
        .merge(api)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn app(state: AppState<PostgresBackend>, request_timeout: Duration) -> Router {
    let api = api_routes().route("/api/restaurants/:restaurant_id", get(handlers::restaurant_get));
    assemble(state, api, request_timeout)
}
