pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod sharding;
pub mod tenant;

#[cfg(test)]
pub mod testing;
