use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use core_config::Properties;
use r2d2::Pool;
use redis::cluster::{ClusterClient, ClusterClientBuilder};
use scheduled_thread_pool::ScheduledThreadPool;
use serde::Serialize;
use tracing::{info, instrument};

use super::config::ClusterConfig;
use super::evictor::{self, EvictionHandle};
use super::nodes::NodeAddress;
use super::pool::{
    CheckoutFailures, ClusterConnectionGuard, ClusterConnectionManager, ReturnPolicy,
    TracingErrorHandler,
};
use crate::common::ClusterResult;

const POOL_THREADS: usize = 3;

/// Snapshot of the connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolState {
    /// Open connections, idle or checked out
    pub connections: u32,
    pub idle_connections: u32,
}

/// Owns the cluster client and its connection pool
///
/// Cloning is cheap; clones share the same pool. The eviction job stops when
/// the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// use redis_cluster::redis::{ClusterConfig, RedisClusterManager};
///
/// let config = ClusterConfig::from_hosts("10.0.0.1:7000,10.0.0.2:7000")?;
/// let manager = RedisClusterManager::connect(config)?;
///
/// let mut conn = manager.get()?;
/// let value: Option<String> = redis::cmd("GET").arg("key").query(&mut *conn)?;
/// ```
#[derive(Clone)]
pub struct RedisClusterManager {
    inner: Arc<Inner>,
}

struct Inner {
    _eviction: Option<EvictionHandle>,
    config: ClusterConfig,
    client: ClusterClient,
    pool: Arc<Pool<ClusterConnectionManager>>,
    failures: CheckoutFailures,
    return_policy: ReturnPolicy,
}

impl RedisClusterManager {
    /// Build the client and fill the pool up to `min_idle`.
    ///
    /// # Arguments
    /// * `config` - Seed nodes, pool limits and client settings; validated first
    ///
    /// # Returns
    /// * `Ok(RedisClusterManager)` once `min_idle` connections are open
    /// * `Err(ClusterError::InvalidPoolConfig)` or `InvalidNode` for a bad config
    /// * `Err(ClusterError::Pool)` if the initial connections cannot be opened
    ///   within `max_wait`
    #[instrument(skip_all, fields(nodes = config.nodes.len()))]
    pub fn connect(config: ClusterConfig) -> ClusterResult<Self> {
        Self::build(config, true)
    }

    /// Build the client and pool without opening any connection yet
    ///
    /// Connections open on the first checkout. The pool does not pre-fill
    /// `min_idle` connections in this mode; returned connections are kept up
    /// to `max_idle` as usual.
    pub fn connect_lazy(config: ClusterConfig) -> ClusterResult<Self> {
        Self::build(config, false)
    }

    /// Parse `properties` and [`connect`](Self::connect)
    pub fn from_properties(properties: &Properties) -> ClusterResult<Self> {
        Self::connect(ClusterConfig::parse_properties(properties)?)
    }

    fn build(config: ClusterConfig, eager: bool) -> ClusterResult<Self> {
        config.validate()?;

        info!(
            nodes = %join_nodes(&config.nodes),
            max_active = config.pool.max_active,
            min_idle = config.pool.min_idle,
            max_idle = config.pool.max_idle,
            "Connecting to Redis cluster"
        );

        let client = build_client(&config)?;
        let thread_pool = Arc::new(ScheduledThreadPool::with_name(
            "redis-cluster-{}",
            POOL_THREADS,
        ));

        // r2d2 fills min_idle in the background as soon as the pool exists
        let min_idle = if eager { config.pool.min_idle } else { 0 };

        let builder = Pool::<ClusterConnectionManager>::builder()
            .max_size(config.pool.max_active)
            .min_idle(Some(min_idle))
            .test_on_check_out(config.pool.test_on_borrow)
            .idle_timeout(config.pool.idle_timeout())
            .max_lifetime(None)
            .connection_timeout(config.pool.max_wait())
            .error_handler(Box::new(TracingErrorHandler))
            .thread_pool(thread_pool.clone());

        let manager = ClusterConnectionManager::new(client.clone());
        let failures = manager.checkout_failures();
        let pool = Arc::new(if eager {
            builder.build(manager)?
        } else {
            builder.build_unchecked(manager)
        });

        let eviction = evictor::start(&pool, failures.clone(), &config.pool, &thread_pool);
        let return_policy = ReturnPolicy {
            test_on_return: config.pool.test_on_return,
            max_idle: config.pool.max_idle,
        };

        let state = pool.state();
        info!(
            connections = state.connections,
            idle = state.idle_connections,
            eviction = eviction.is_some(),
            "Redis cluster pool ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                _eviction: eviction,
                config,
                client,
                pool,
                failures,
                return_policy,
            }),
        })
    }

    /// Check out a connection, waiting up to `max_wait` for one to free up
    pub fn get(&self) -> ClusterResult<ClusterConnectionGuard> {
        let conn = self.inner.pool.get()?;
        Ok(self.guard(conn))
    }

    /// Check out an idle connection without waiting or connecting
    pub fn try_get(&self) -> Option<ClusterConnectionGuard> {
        self.inner.pool.try_get().map(|conn| self.guard(conn))
    }

    fn guard(&self, conn: r2d2::PooledConnection<ClusterConnectionManager>) -> ClusterConnectionGuard {
        ClusterConnectionGuard::new(conn, (*self.inner.pool).clone(), self.inner.return_policy)
    }

    /// The underlying cluster client, for connections outside the pool
    pub fn client(&self) -> &ClusterClient {
        &self.inner.client
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    pub fn nodes(&self) -> &BTreeSet<NodeAddress> {
        &self.inner.config.nodes
    }

    pub fn state(&self) -> PoolState {
        let state = self.inner.pool.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Run one idle-connection test pass now, outside the schedule
    pub fn evict_idle(&self) -> evictor::EvictionRun {
        evictor::run_once(&self.inner.pool, &self.inner.failures, &self.inner.config.pool)
    }
}

impl fmt::Debug for RedisClusterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisClusterManager")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

fn build_client(config: &ClusterConfig) -> ClusterResult<ClusterClient> {
    let mut builder = ClusterClientBuilder::new(config.redis_urls())
        .connection_timeout(config.timeout())
        .response_timeout(config.timeout())
        .retries(config.retries());

    if let Some(username) = &config.username {
        builder = builder.username(username.clone());
    }
    if let Some(password) = &config.password {
        builder = builder.password(password.clone());
    }

    Ok(builder.build()?)
}

fn join_nodes(nodes: &BTreeSet<NodeAddress>) -> String {
    nodes
        .iter()
        .map(NodeAddress::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
