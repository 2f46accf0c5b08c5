pub mod hash;
pub mod health;
pub mod postgres;
pub mod router;

pub use health::{HealthMonitor, HealthReport, HealthStatus, HealthSummary, LatestHealth, ShardHealth};
pub use postgres::PostgresBackend;
pub use router::{RouterSettings, ShardBackend, ShardConnection, ShardError, ShardRouter};
