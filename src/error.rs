// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::middleware::routing::RoutingError;
use crate::sharding::ShardError;
use crate::tenant::{IsolationError, TenantError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest { message: String, code: &'static str },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden { message: String, code: &'static str },

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable { message: String, code: &'static str },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable { message, .. } => message,
        }
    }

    /// Error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => code,
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden { code, .. } => code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable { code, .. } => code,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            code: "BAD_REQUEST",
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            code: "FORBIDDEN",
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable {
            message: message.into(),
            code: "SERVICE_UNAVAILABLE",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidSecret | AuthError::SigningFailed(_) => {
                tracing::error!("Token service error: {}", err);
                ApiError::internal_server_error("Authentication is not available")
            }
            // Keep the reason coarse: clients only learn that the credential was refused.
            AuthError::MalformedToken(_) => ApiError::unauthorized("Invalid token"),
            other => ApiError::unauthorized(other.to_string()),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::MissingTenantContext => ApiError::BadRequest {
                message: err.to_string(),
                code: "MISSING_TENANT_CONTEXT",
            },
            TenantError::InvalidHeaderFormat { .. } => ApiError::BadRequest {
                message: err.to_string(),
                code: "INVALID_HEADER_FORMAT",
            },
            TenantError::Isolation(isolation) => isolation.into(),
        }
    }
}

impl From<IsolationError> for ApiError {
    fn from(err: IsolationError) -> Self {
        let code = match err {
            IsolationError::CrossTenantAccess { .. } => "CROSS_TENANT_ACCESS",
            IsolationError::CrossRestaurantAccess { .. } => "CROSS_RESTAURANT_ACCESS",
            IsolationError::ShardMismatch { .. } => "SHARD_MISMATCH",
            IsolationError::InvalidTenant(_) | IsolationError::InvalidRestaurant(_) => "INVALID_TENANT_CONTEXT",
        };
        ApiError::Forbidden {
            message: err.to_string(),
            code,
        }
    }
}

impl From<ShardError> for ApiError {
    fn from(err: ShardError) -> Self {
        match err {
            ShardError::Unreachable { shard, .. } => {
                tracing::error!(shard, "Shard unavailable: {}", err);
                ApiError::ServiceUnavailable {
                    message: format!("Shard {shard} temporarily unavailable"),
                    code: "SHARD_UNREACHABLE",
                }
            }
            other => {
                tracing::error!("Shard routing error: {}", other);
                ApiError::internal_server_error("Shard routing failed")
            }
        }
    }
}

impl From<RoutingError> for ApiError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Authentication(e) => e.into(),
            RoutingError::Tenant(e) => e.into(),
            RoutingError::Shard(e) => e.into(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => ApiError::ServiceUnavailable {
                message: "Database temporarily unavailable".to_string(),
                code: "SHARD_UNREACHABLE",
            },
            other => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", other);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
