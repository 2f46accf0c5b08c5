// handlers/mod.rs - HTTP handlers
//
// Public handlers (service info, liveness, shard topology) need no credentials.
// Handlers under /api/* run behind the shard routing middleware and receive a
// fully resolved routing context.

pub mod context;
pub mod public;
pub mod restaurant;
pub mod shards;

pub use context::routing_context;
pub use public::{health, root};
pub use restaurant::restaurant_get;
pub use shards::{shard_health, shard_list};
