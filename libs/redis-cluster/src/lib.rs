//! Redis cluster connection manager
//!
//! Reads pool and cluster settings from a property map, a properties file or
//! environment variables, builds a `redis` cluster client, and pools its
//! connections with `r2d2`.
//!
//! # Examples
//!
//! ## From properties
//!
//! ```ignore
//! use core_config::Properties;
//! use redis_cluster::redis::RedisClusterManager;
//!
//! let props = Properties::load("redis.properties")?;
//! let manager = RedisClusterManager::from_properties(&props)?;
//!
//! let mut conn = manager.get()?;
//! let _: () = redis::cmd("SET").arg("key").arg("value").query(&mut *conn)?;
//! ```
//!
//! ## From environment variables
//!
//! ```ignore
//! use redis_cluster::redis::{ClusterConfig, RedisClusterManager, check_health};
//!
//! // REDIS_HOSTS=10.0.0.1:7000,10.0.0.2:7000 REDIS_MAX_ACTIVE=32
//! let config = ClusterConfig::load_env()?;
//! let manager = RedisClusterManager::connect(config)?;
//! check_health(&manager)?;
//! ```
//!
//! ## Process-wide instance
//!
//! ```ignore
//! use redis_cluster::redis::{create_instance, instance};
//!
//! create_instance(ClusterConfig::load_env()?)?;
//! let manager = instance().expect("created at startup");
//! ```

pub mod common;
pub mod redis;

pub use common::{ClusterError, ClusterResult};
