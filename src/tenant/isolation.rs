//! Fail-secure tenant and shard assertions.
//!
//! The middleware already refuses requests without a positive tenant and restaurant, and
//! every restaurant lives on exactly one shard. Handlers still call these before touching
//! a specific row: a bug in one layer must not be enough to leak another tenant's data.

use thiserror::Error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Tracing target for isolation violations. Route it to the audit sink.
pub const AUDIT_TARGET: &str = "tenant_audit";

/// Pins the audit target at WARN on top of `filter`. Violations are recorded whatever
/// `RUST_LOG` says, including an explicit `tenant_audit=off`.
pub fn with_audit_trail(filter: EnvFilter) -> EnvFilter {
    match format!("{AUDIT_TARGET}=warn").parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

pub trait TenantScope {
    fn tenant_id(&self) -> i64;
    fn restaurant_id(&self) -> i64;
}

pub trait ShardScope {
    fn shard_number(&self) -> usize;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IsolationError {
    #[error("Invalid tenant context")]
    InvalidTenant(i64),

    #[error("Invalid restaurant context")]
    InvalidRestaurant(i64),

    #[error("Resource does not belong to tenant")]
    CrossTenantAccess {
        request_tenant: i64,
        resource_tenant: i64,
    },

    #[error("Resource does not belong to restaurant")]
    CrossRestaurantAccess {
        request_restaurant: i64,
        resource_restaurant: i64,
    },

    #[error("Resource is not on the request's shard")]
    ShardMismatch {
        request_shard: usize,
        resource_shard: usize,
    },
}

impl IsolationError {
    /// Violations that indicate a bug or an exploitation attempt rather than a bad request.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            IsolationError::CrossTenantAccess { .. }
                | IsolationError::CrossRestaurantAccess { .. }
                | IsolationError::ShardMismatch { .. }
        )
    }
}

pub fn verify_tenant<S: TenantScope + ?Sized>(scope: &S) -> Result<i64, IsolationError> {
    let tenant_id = scope.tenant_id();
    if tenant_id <= 0 {
        tracing::warn!(tenant_id, "rejected invalid tenant context");
        return Err(IsolationError::InvalidTenant(tenant_id));
    }
    Ok(tenant_id)
}

pub fn verify_restaurant<S: TenantScope + ?Sized>(scope: &S) -> Result<i64, IsolationError> {
    let restaurant_id = scope.restaurant_id();
    if restaurant_id <= 0 {
        tracing::warn!(restaurant_id, "rejected invalid restaurant context");
        return Err(IsolationError::InvalidRestaurant(restaurant_id));
    }
    Ok(restaurant_id)
}

/// Accepts only when both tenants are strictly positive and equal.
pub fn verify_ownership(request_tenant_id: i64, resource_tenant_id: i64) -> Result<(), IsolationError> {
    if request_tenant_id > 0 && request_tenant_id == resource_tenant_id {
        return Ok(());
    }

    let err = IsolationError::CrossTenantAccess {
        request_tenant: request_tenant_id,
        resource_tenant: resource_tenant_id,
    };
    record(&err);
    Err(err)
}

/// Restaurant-scoped data: the resource must belong to the request's own restaurant.
pub fn verify_restaurant_access<S: TenantScope + ?Sized>(
    scope: &S,
    resource_restaurant_id: i64,
) -> Result<(), IsolationError> {
    let request_restaurant = verify_restaurant(scope)?;
    if request_restaurant == resource_restaurant_id {
        return Ok(());
    }

    let err = IsolationError::CrossRestaurantAccess {
        request_restaurant,
        resource_restaurant: resource_restaurant_id,
    };
    record(&err);
    Err(err)
}

pub fn verify_shard_access<S: ShardScope + ?Sized>(scope: &S, target_shard: usize) -> Result<(), IsolationError> {
    let request_shard = scope.shard_number();
    if request_shard == target_shard {
        return Ok(());
    }

    let err = IsolationError::ShardMismatch {
        request_shard,
        resource_shard: target_shard,
    };
    record(&err);
    Err(err)
}

/// Write an audit record for a violation. Non-violations are ignored.
pub fn record(err: &IsolationError) {
    match err {
        IsolationError::CrossTenantAccess {
            request_tenant,
            resource_tenant,
        } => {
            tracing::warn!(
                target: AUDIT_TARGET,
                request_tenant,
                resource_tenant,
                "cross-tenant access attempt"
            );
        }
        IsolationError::CrossRestaurantAccess {
            request_restaurant,
            resource_restaurant,
        } => {
            tracing::warn!(
                target: AUDIT_TARGET,
                request_restaurant,
                resource_restaurant,
                "cross-restaurant access attempt"
            );
        }
        IsolationError::ShardMismatch {
            request_shard,
            resource_shard,
        } => {
            tracing::warn!(
                target: AUDIT_TARGET,
                request_shard,
                resource_shard,
                "cross-shard access attempt"
            );
        }
        _ => {}
    }
}
