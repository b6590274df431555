use serde::Serialize;
use tracing::debug;

use super::manager::{PoolState, RedisClusterManager};
use crate::common::ClusterError;

/// Check Redis cluster health
///
/// Checks out a pooled connection and sends `PING`, which the cluster client
/// routes to one of the nodes. Useful for readiness and liveness probes.
///
/// # Example
/// ```ignore
/// use redis_cluster::redis::{RedisClusterManager, check_health};
///
/// let manager = RedisClusterManager::connect(config)?;
/// check_health(&manager)?;
/// ```
pub fn check_health(manager: &RedisClusterManager) -> Result<(), ClusterError> {
    debug!("Running Redis cluster health check");

    let mut conn = manager
        .get()
        .map_err(|e| ClusterError::HealthCheckFailed(format!("no connection available: {}", e)))?;

    let response: String = redis::cmd("PING").query(&mut *conn).map_err(|e| {
        ClusterError::HealthCheckFailed(format!("Redis cluster health check failed: {}", e))
    })?;

    if response != "PONG" {
        return Err(ClusterError::HealthCheckFailed(format!(
            "Redis PING returned unexpected response: {}",
            response
        )));
    }

    debug!("Redis cluster health check passed");
    Ok(())
}

/// Check Redis cluster health with a custom command
///
/// # Example
/// ```ignore
/// use redis_cluster::redis::check_health_with_command;
///
/// check_health_with_command(&manager, redis::cmd("EXISTS").arg("healthcheck_key"))?;
/// ```
pub fn check_health_with_command(
    manager: &RedisClusterManager,
    command: &mut redis::Cmd,
) -> Result<(), ClusterError> {
    debug!("Running Redis cluster health check with custom command");

    let mut conn = manager
        .get()
        .map_err(|e| ClusterError::HealthCheckFailed(format!("no connection available: {}", e)))?;

    command.query::<redis::Value>(&mut *conn).map_err(|e| {
        ClusterError::HealthCheckFailed(format!("Redis cluster health check failed: {}", e))
    })?;

    debug!("Redis cluster health check passed");
    Ok(())
}

/// Health check result for detailed status reporting
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,

    /// Error message if unhealthy
    pub message: Option<String>,

    pub response_time_ms: u64,

    /// Pool state after the check
    pub pool: PoolState,
}

impl HealthStatus {
    pub fn healthy(response_time_ms: u64, pool: PoolState) -> Self {
        Self {
            healthy: true,
            message: None,
            response_time_ms,
            pool,
        }
    }

    pub fn unhealthy(message: String, response_time_ms: u64, pool: PoolState) -> Self {
        Self {
            healthy: false,
            message: Some(message),
            response_time_ms,
            pool,
        }
    }
}

/// Check Redis cluster health and report response time and pool state
pub fn check_health_detailed(manager: &RedisClusterManager) -> HealthStatus {
    let start = std::time::Instant::now();
    let result = check_health(manager);
    let elapsed = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => HealthStatus::healthy(elapsed, manager.state()),
        Err(e) => HealthStatus::unhealthy(e.to_string(), elapsed, manager.state()),
    }
}
