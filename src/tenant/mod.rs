pub mod isolation;

use axum::http::HeaderMap;
use serde::Serialize;
use thiserror::Error;

use crate::auth::Claims;
pub use isolation::{
    verify_ownership, verify_restaurant, verify_restaurant_access, verify_shard_access, verify_tenant,
    IsolationError, ShardScope, TenantScope,
};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const RESTAURANT_HEADER: &str = "x-restaurant-id";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("Missing tenant context")]
    MissingTenantContext,

    #[error("Invalid {header} header: {value:?}")]
    InvalidHeaderFormat { header: &'static str, value: String },

    #[error(transparent)]
    Isolation(#[from] IsolationError),
}

/// Where a tenant identity came from. Header identities are lower trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Claims,
    Headers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantIdentity {
    pub tenant_id: i64,
    pub restaurant_id: i64,
    pub source: IdentitySource,
}

impl TenantScope for TenantIdentity {
    fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    fn restaurant_id(&self) -> i64 {
        self.restaurant_id
    }
}

/// Extracts tenant and restaurant identity, preferring verified claims over headers.
#[derive(Debug, Clone, Copy)]
pub struct TenantResolver {
    allow_header_fallback: bool,
}

impl TenantResolver {
    pub fn new(allow_header_fallback: bool) -> Self {
        Self { allow_header_fallback }
    }

    pub fn allows_header_fallback(&self) -> bool {
        self.allow_header_fallback
    }

    pub fn resolve(&self, claims: Option<&Claims>, headers: &HeaderMap) -> Result<TenantIdentity, TenantError> {
        if let Some(claims) = claims {
            if claims.tenant_id > 0 && claims.restaurant_id > 0 {
                return Ok(TenantIdentity {
                    tenant_id: claims.tenant_id,
                    restaurant_id: claims.restaurant_id,
                    source: IdentitySource::Claims,
                });
            }
            tracing::debug!(
                tenant_id = claims.tenant_id,
                restaurant_id = claims.restaurant_id,
                "claims lack restaurant scope, trying headers"
            );
        }

        if !self.allow_header_fallback {
            return Err(TenantError::MissingTenantContext);
        }

        let (tenant_raw, restaurant_raw) = match (headers.get(TENANT_HEADER), headers.get(RESTAURANT_HEADER)) {
            (Some(tenant), Some(restaurant)) => (tenant, restaurant),
            _ => return Err(TenantError::MissingTenantContext),
        };

        let tenant_id = parse_positive_id(TENANT_HEADER, tenant_raw.as_bytes())?;
        let restaurant_id = parse_positive_id(RESTAURANT_HEADER, restaurant_raw.as_bytes())?;

        // A token that names a tenant pins it; headers may only pick a restaurant inside it.
        if let Some(claims) = claims.filter(|c| c.tenant_id > 0) {
            verify_ownership(claims.tenant_id, tenant_id)?;
        }

        Ok(TenantIdentity {
            tenant_id,
            restaurant_id,
            source: IdentitySource::Headers,
        })
    }
}

/// Strict base-10: ASCII digits only, no sign, no whitespace, fits in i64, above zero.
fn parse_positive_id(header: &'static str, raw: &[u8]) -> Result<i64, TenantError> {
    let invalid = || TenantError::InvalidHeaderFormat {
        header,
        value: String::from_utf8_lossy(raw).into_owned(),
    };

    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    let text = std::str::from_utf8(raw).map_err(|_| invalid())?;
    match text.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(invalid()),
    }
}
