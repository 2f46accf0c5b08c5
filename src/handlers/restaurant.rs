// handlers/restaurant.rs - GET /api/restaurants/:restaurant_id

use axum::extract::{Path, State};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, RoutingContext};
use crate::sharding::PostgresBackend;
use crate::tenant::{
    verify_ownership, verify_restaurant_access, verify_shard_access, verify_tenant, IsolationError, ShardScope,
    TenantScope,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Restaurant {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
}

/// Checks that must pass before any row is read: a valid tenant, the caller's own
/// restaurant, and the shard that restaurant hashes to.
pub fn authorize_lookup<C>(ctx: &C, restaurant_id: i64, owning_shard: usize) -> Result<(), IsolationError>
where
    C: TenantScope + ShardScope,
{
    verify_tenant(ctx)?;
    verify_restaurant_access(ctx, restaurant_id)?;
    verify_shard_access(ctx, owning_shard)
}

pub async fn restaurant_get(
    State(state): State<AppState<PostgresBackend>>,
    Path(restaurant_id): Path<i64>,
    ctx: RoutingContext,
) -> ApiResult<Restaurant> {
    let owning_shard = state.pipeline.router().shard_for(restaurant_id);
    authorize_lookup(&ctx, restaurant_id, owning_shard)?;

    let restaurant = sqlx::query_as::<_, Restaurant>("SELECT id, tenant_id, name FROM restaurants WHERE id = $1")
        .bind(restaurant_id)
        .fetch_optional(ctx.pool())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Restaurant {restaurant_id} not found")))?;

    // The row itself has the final say on ownership
    verify_ownership(ctx.tenant_id(), restaurant.tenant_id)?;

    Ok(ApiResponse::success(restaurant))
}
