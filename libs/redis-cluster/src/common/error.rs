use core_config::ConfigError;

/// Error type for cluster configuration, connection and pool operations
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Errors reported by the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection pool errors (checkout timeouts, failed initial fill)
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Property or environment configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A `host:port` entry that could not be parsed
    #[error("Invalid cluster node: {0}")]
    InvalidNode(String),

    /// Pool limits that contradict each other
    #[error("Invalid pool configuration: {0}")]
    InvalidPoolConfig(String),

    /// Health check failed
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// The process-wide manager was already created
    #[error("Redis cluster manager is already initialized")]
    AlreadyInitialized,
}

/// Result type alias for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;
