pub mod auth;
pub mod response;
pub mod routing;

pub use auth::bearer_token;
pub use response::{ApiResponse, ApiResult};
pub use routing::{
    shard_routing_middleware, RequestRoutingContext, RoutingContext, RoutingError, RoutingPipeline, RoutingStage,
};
