//! Redis cluster client, connection pool and helpers
//!
//! Provides configuration parsing, pooled cluster connections and health checks.

mod config;
mod evictor;
#[cfg(test)]
mod fake_node;
mod global;
mod health;
mod manager;
mod nodes;
mod pool;

pub use config::{ClusterConfig, PoolConfig, defaults, keys};
pub use evictor::{EvictionHandle, EvictionRun};
pub use global::{create_instance, instance, set_instance};
pub use health::{HealthStatus, check_health, check_health_detailed, check_health_with_command};
pub use manager::{PoolState, RedisClusterManager};
pub use nodes::{NodeAddress, parse_nodes};
pub use pool::{
    CheckoutFailures, ClusterConnectionGuard, ClusterConnectionManager, ManagedConnection,
};

// Re-export redis types for convenience
pub use redis::cluster::{ClusterClient, ClusterConnection};
pub use redis::{Commands, RedisResult};
