//! Opt-in process-wide manager
//!
//! Prefer passing a [`RedisClusterManager`] around explicitly. This accessor
//! exists for code that cannot thread a handle through, and can only be set
//! once per process.

use once_cell::sync::OnceCell;
use tracing::info;

use super::config::ClusterConfig;
use super::manager::RedisClusterManager;
use crate::common::{ClusterError, ClusterResult};

static INSTANCE: OnceCell<RedisClusterManager> = OnceCell::new();

/// Connect with `config` and publish the manager process-wide
pub fn create_instance(config: ClusterConfig) -> ClusterResult<&'static RedisClusterManager> {
    if INSTANCE.get().is_some() {
        return Err(ClusterError::AlreadyInitialized);
    }

    set_instance(RedisClusterManager::connect(config)?)
}

/// Publish an already built manager process-wide
pub fn set_instance(manager: RedisClusterManager) -> ClusterResult<&'static RedisClusterManager> {
    let instance = INSTANCE
        .try_insert(manager)
        .map_err(|_| ClusterError::AlreadyInitialized)?;

    info!("Published process-wide Redis cluster manager");
    Ok(instance)
}

/// The process-wide manager, if one was created
pub fn instance() -> Option<&'static RedisClusterManager> {
    INSTANCE.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::PoolConfig;

    #[test]
    fn test_instance_is_set_once() {
        assert!(instance().is_none());

        let config = ClusterConfig::from_hosts("127.0.0.1:1")
            .unwrap()
            .with_pool(PoolConfig::new().with_min_idle(0));

        let manager = RedisClusterManager::connect_lazy(config.clone()).unwrap();
        let published = set_instance(manager).unwrap();
        assert!(std::ptr::eq(published, instance().unwrap()));

        let again = RedisClusterManager::connect_lazy(config.clone()).unwrap();
        assert!(matches!(
            set_instance(again),
            Err(ClusterError::AlreadyInitialized)
        ));
        assert!(matches!(
            create_instance(config),
            Err(ClusterError::AlreadyInitialized)
        ));
    }
}
