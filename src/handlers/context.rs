// handlers/context.rs - GET /api/context

use serde::Serialize;

use crate::middleware::{ApiResult, ApiResponse, RequestRoutingContext, RoutingStage};
use crate::tenant::{verify_restaurant, verify_tenant, IdentitySource};

#[derive(Debug, Serialize)]
pub struct ContextView {
    pub tenant_id: i64,
    pub restaurant_id: i64,
    pub shard: usize,
    pub source: IdentitySource,
    pub user_id: Option<i64>,
    pub role: Option<String>,
    pub stage: RoutingStage,
}

/// Echoes the routing decision made for this request.
pub async fn routing_context<P>(ctx: RequestRoutingContext<P>) -> ApiResult<ContextView>
where
    P: Clone + Send + Sync + 'static,
{
    verify_tenant(&ctx)?;
    verify_restaurant(&ctx)?;

    Ok(ApiResponse::success(ContextView {
        tenant_id: ctx.tenant_id(),
        restaurant_id: ctx.restaurant_id(),
        shard: ctx.shard_number(),
        source: ctx.identity().source,
        user_id: ctx.claims().map(|c| c.user_id),
        role: ctx.claims().map(|c| c.role.clone()),
        stage: RoutingStage::Dispatched,
    }))
}
