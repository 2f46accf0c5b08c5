use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use sqlx::PgPool;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::auth::bearer_token;
use crate::auth::{AuthError, Claims, TokenService};
use crate::error::ApiError;
use crate::sharding::{ShardBackend, ShardConnection, ShardError, ShardRouter};
use crate::tenant::{ShardScope, TenantError, TenantIdentity, TenantResolver, TenantScope};

/// How far a request got through the routing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStage {
    Unauthenticated,
    /// Token verified, or an anonymous header-fallback caller let through.
    Authenticated,
    TenantResolved,
    ShardResolved,
    Dispatched,
}

impl fmt::Display for RoutingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoutingStage::Unauthenticated => "unauthenticated",
            RoutingStage::Authenticated => "authenticated",
            RoutingStage::TenantResolved => "tenant_resolved",
            RoutingStage::ShardResolved => "shard_resolved",
            RoutingStage::Dispatched => "dispatched",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Shard(#[from] ShardError),
}

impl RoutingError {
    /// Last stage the request reached before failing.
    pub fn stage(&self) -> RoutingStage {
        match self {
            RoutingError::Authentication(_) => RoutingStage::Unauthenticated,
            RoutingError::Tenant(_) => RoutingStage::Authenticated,
            RoutingError::Shard(_) => RoutingStage::TenantResolved,
        }
    }
}

/// Everything a tenant-scoped handler needs, resolved once per request. Only ever built
/// complete, so a handler either sees all of it or the request never reaches it.
#[derive(Debug, Clone)]
pub struct RequestRoutingContext<P> {
    claims: Option<Claims>,
    identity: TenantIdentity,
    connection: ShardConnection<P>,
}

/// Routing context as seen by handlers running against Postgres shards.
pub type RoutingContext = RequestRoutingContext<PgPool>;

impl<P> RequestRoutingContext<P> {
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn identity(&self) -> &TenantIdentity {
        &self.identity
    }

    pub fn tenant_id(&self) -> i64 {
        self.identity.tenant_id
    }

    pub fn restaurant_id(&self) -> i64 {
        self.identity.restaurant_id
    }

    pub fn shard_number(&self) -> usize {
        self.connection.shard_number()
    }

    pub fn connection(&self) -> &ShardConnection<P> {
        &self.connection
    }

    pub fn pool(&self) -> &P {
        self.connection.pool()
    }
}

impl<P> TenantScope for RequestRoutingContext<P> {
    fn tenant_id(&self) -> i64 {
        self.identity.tenant_id
    }

    fn restaurant_id(&self) -> i64 {
        self.identity.restaurant_id
    }
}

impl<P> ShardScope for RequestRoutingContext<P> {
    fn shard_number(&self) -> usize {
        self.connection.shard_number()
    }
}

#[axum::async_trait]
impl<S, P> FromRequestParts<S> for RequestRoutingContext<P>
where
    S: Send + Sync,
    P: Clone + Send + Sync + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            tracing::error!("handler reached without a routing context");
            ApiError::internal_server_error("Request routing context missing")
        })
    }
}

/// Token verification, tenant resolution and shard resolution, in that order.
pub struct RoutingPipeline<B: ShardBackend> {
    tokens: Arc<TokenService>,
    resolver: TenantResolver,
    router: Arc<ShardRouter<B>>,
}

impl<B: ShardBackend> RoutingPipeline<B> {
    pub fn new(tokens: Arc<TokenService>, resolver: TenantResolver, router: Arc<ShardRouter<B>>) -> Self {
        Self {
            tokens,
            resolver,
            router,
        }
    }

    pub fn router(&self) -> &Arc<ShardRouter<B>> {
        &self.router
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub async fn route(&self, headers: &HeaderMap) -> Result<RequestRoutingContext<B::Pool>, RoutingError> {
        let claims = self.authenticate(headers)?;
        let identity = self.resolver.resolve(claims.as_ref(), headers)?;
        let connection = self.router.connection_for(identity.restaurant_id).await?;

        Ok(RequestRoutingContext {
            claims,
            identity,
            connection,
        })
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Claims>, AuthError> {
        match bearer_token(headers)? {
            Some(token) => self.tokens.validate(token).map(Some),
            None if self.resolver.allows_header_fallback() => Ok(None),
            None => Err(AuthError::MissingCredential),
        }
    }
}

/// Resolves the routing context and hands it to the next handler. Any failure ends the
/// request here with the matching error response.
pub async fn shard_routing_middleware<B: ShardBackend>(
    State(pipeline): State<Arc<RoutingPipeline<B>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    let context = match pipeline.route(&parts.headers).await {
        Ok(context) => context,
        Err(err) => {
            log_rejection(&parts, &err);
            return Err(err.into());
        }
    };

    tracing::debug!(
        method = %parts.method,
        path = parts.uri.path(),
        tenant_id = context.tenant_id(),
        restaurant_id = context.restaurant_id(),
        shard = context.shard_number(),
        source = ?context.identity().source,
        stage = %RoutingStage::Dispatched,
        "request routed"
    );

    parts.extensions.insert(context);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

fn log_rejection(parts: &Parts, err: &RoutingError) {
    let stage = err.stage();
    match err {
        RoutingError::Shard(_) => {
            tracing::error!(method = %parts.method, path = parts.uri.path(), %stage, error = %err, "request routing failed")
        }
        _ => {
            tracing::info!(method = %parts.method, path = parts.uri.path(), %stage, error = %err, "request rejected")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::RouterSettings;
    use crate::testing::{subject, test_shards, test_tokens, FakeBackend, FakePool};
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        routing::get,
        Router,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        backend: FakeBackend,
        pipeline: Arc<RoutingPipeline<FakeBackend>>,
        reached: Arc<AtomicBool>,
    }

    impl Harness {
        fn new(allow_header_fallback: bool) -> Self {
            let backend = FakeBackend::default();
            let settings = RouterSettings {
                connect_retries: 0,
                retry_backoff: Duration::from_millis(1),
                ..RouterSettings::default()
            };
            let router = Arc::new(ShardRouter::new(test_shards(4), backend.clone(), settings).unwrap());
            let pipeline = Arc::new(RoutingPipeline::new(
                Arc::new(test_tokens()),
                TenantResolver::new(allow_header_fallback),
                router,
            ));
            Self {
                backend,
                pipeline,
                reached: Arc::new(AtomicBool::new(false)),
            }
        }

        fn app(&self) -> Router {
            let reached = self.reached.clone();
            Router::new()
                .route(
                    "/scoped",
                    get(move |ctx: RequestRoutingContext<FakePool>| async move {
                        reached.store(true, Ordering::SeqCst);
                        format!("{}:{}:{}", ctx.tenant_id(), ctx.restaurant_id(), ctx.shard_number())
                    }),
                )
                .route_layer(axum::middleware::from_fn_with_state(
                    self.pipeline.clone(),
                    shard_routing_middleware::<FakeBackend>,
                ))
        }

        async fn send(&self, headers: &[(&str, &str)]) -> (StatusCode, String) {
            let mut request = axum::http::Request::builder().uri("/scoped");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let response = self.app().oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8(body.to_vec()).unwrap())
        }

        fn reached(&self) -> bool {
            self.reached.load(Ordering::SeqCst)
        }
    }

    fn bearer(tenant_id: i64, restaurant_id: Option<i64>) -> String {
        format!("Bearer {}", test_tokens().issue(subject(tenant_id, restaurant_id)).unwrap())
    }

    #[tokio::test]
    async fn token_claims_route_to_the_owning_shard() {
        let harness = Harness::new(true);
        let auth = bearer(1, Some(100));
        let (status, body) = harness.send(&[("authorization", auth.as_str())]).await;

        let shard = harness.pipeline.router().shard_for(100);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("1:100:{shard}"));
    }

    #[tokio::test]
    async fn same_restaurant_always_lands_on_same_shard() {
        let harness = Harness::new(true);
        let auth = bearer(1, Some(42));
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(harness.send(&[("authorization", auth.as_str())]).await.1);
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn header_fallback_routes_internal_callers() {
        let harness = Harness::new(true);
        let (status, body) = harness
            .send(&[("x-tenant-id", "2"), ("x-restaurant-id", "300")])
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("2:300:"));
    }

    #[tokio::test]
    async fn no_credentials_no_headers_is_missing_context() {
        let harness = Harness::new(true);
        let (status, body) = harness.send(&[]).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("MISSING_TENANT_CONTEXT"));
        assert!(!harness.reached());
        // No shard was touched
        assert_eq!((0..4).map(|s| harness.backend.attempts(s)).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn missing_credential_is_401_without_fallback() {
        let harness = Harness::new(false);
        let (status, _) = harness
            .send(&[("x-tenant-id", "2"), ("x-restaurant-id", "300")])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!harness.reached());
    }

    #[tokio::test]
    async fn invalid_token_is_never_downgraded() {
        let harness = Harness::new(true);
        for auth in ["Bearer not.a.token", "Token abc", "Bearer "] {
            let (status, _) = harness
                .send(&[
                    ("authorization", auth),
                    ("x-tenant-id", "1"),
                    ("x-restaurant-id", "100"),
                ])
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{auth:?}");
        }
        assert!(!harness.reached());
    }

    #[tokio::test]
    async fn malformed_fallback_header_is_400() {
        let harness = Harness::new(true);
        let (status, body) = harness
            .send(&[("x-tenant-id", "one"), ("x-restaurant-id", "100")])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("INVALID_HEADER_FORMAT"));
    }

    #[tokio::test]
    async fn header_cannot_switch_token_tenant() {
        let harness = Harness::new(true);
        let auth = bearer(1, None);
        let (status, body) = harness
            .send(&[
                ("authorization", auth.as_str()),
                ("x-tenant-id", "2"),
                ("x-restaurant-id", "300"),
            ])
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("CROSS_TENANT_ACCESS"));
        assert!(!harness.reached());
    }

    #[tokio::test]
    async fn unreachable_shard_is_503_and_handler_never_runs() {
        let harness = Harness::new(true);
        let shard = harness.pipeline.router().shard_for(300);
        harness.backend.set_unreachable(shard, true);

        let (status, body) = harness
            .send(&[("x-tenant-id", "2"), ("x-restaurant-id", "300")])
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("SHARD_UNREACHABLE"));
        assert!(!harness.reached());

        // Restaurants on healthy shards are unaffected
        let healthy = (1..).find(|id| harness.pipeline.router().shard_for(*id) != shard).unwrap();
        let restaurant = healthy.to_string();
        let (status, _) = harness
            .send(&[("x-tenant-id", "2"), ("x-restaurant-id", restaurant.as_str())])
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn shard_lost_between_requests_is_503() {
        let harness = Harness::new(true);
        let headers = [("x-tenant-id", "2"), ("x-restaurant-id", "300")];
        let (status, _) = harness.send(&headers).await;
        assert_eq!(status, StatusCode::OK);

        let shard = harness.pipeline.router().shard_for(300);
        harness.backend.set_unreachable(shard, true);
        harness.reached.store(false, Ordering::SeqCst);

        let (status, body) = harness.send(&headers).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("SHARD_UNREACHABLE"));
        assert!(!harness.reached());
        assert_eq!(harness.backend.connects(shard), 1);
    }

    #[tokio::test]
    async fn context_extractor_without_middleware_is_500() {
        let app = Router::new().route("/bare", get(|_ctx: RequestRoutingContext<FakePool>| async { "unreachable" }));
        let response = app
            .oneshot(axum::http::Request::builder().uri("/bare").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn stage_reported_for_failures() {
        let harness = Harness::new(true);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer not.a.token".parse().unwrap());
        let err = harness.pipeline.route(&headers).await.unwrap_err();
        assert_eq!(err.stage(), RoutingStage::Unauthenticated);

        let err = harness.pipeline.route(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err, RoutingError::Tenant(TenantError::MissingTenantContext));
        assert_eq!(err.stage(), RoutingStage::Authenticated);

        assert_eq!(
            RoutingError::Shard(ShardError::unreachable(0, "down")).stage(),
            RoutingStage::TenantResolved
        );
    }

    #[tokio::test]
    async fn cross_tenant_rejection_is_reported_after_authentication() {
        let harness = Harness::new(true);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", bearer(1, None).parse().unwrap());
        headers.insert("x-tenant-id", "2".parse().unwrap());
        headers.insert("x-restaurant-id", "300".parse().unwrap());

        let err = harness.pipeline.route(&headers).await.unwrap_err();
        assert!(matches!(err, RoutingError::Tenant(TenantError::Isolation(_))));
        assert_eq!(err.stage(), RoutingStage::Authenticated);
        assert_eq!(err.stage().to_string(), "authenticated");
    }
}
