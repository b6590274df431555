use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use r2d2::{HandleError, ManageConnection, Pool, PooledConnection};
use redis::cluster::{ClusterClient, ClusterConnection};
use redis::{ConnectionLike, RedisError};
use tracing::{debug, warn};

/// A pooled cluster connection plus the pool's bookkeeping flag
pub struct ManagedConnection {
    pub(crate) conn: ClusterConnection,
    pub(crate) broken: bool,
}

impl ManagedConnection {
    fn new(conn: ClusterConnection) -> Self {
        Self {
            conn,
            broken: false,
        }
    }

    /// PING every node this connection talks to
    pub(crate) fn ping(&mut self) -> bool {
        self.conn.check_connection()
    }
}

/// Running count of connections that failed the PING on checkout
///
/// r2d2 drops those connections itself, so this is the only trace of them.
#[derive(Debug, Clone, Default)]
pub struct CheckoutFailures(Arc<AtomicUsize>);

impl CheckoutFailures {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// r2d2 connection manager over a [`ClusterClient`]
///
/// Validation on checkout issues a PING. Connections flagged broken, or
/// closed by the client, are discarded when they return to the pool.
#[derive(Clone)]
pub struct ClusterConnectionManager {
    client: ClusterClient,
    failures: CheckoutFailures,
}

impl ClusterConnectionManager {
    pub fn new(client: ClusterClient) -> Self {
        Self {
            client,
            failures: CheckoutFailures::default(),
        }
    }

    /// Shared handle on the checkout failure count, readable after the
    /// manager has moved into the pool
    pub fn checkout_failures(&self) -> CheckoutFailures {
        self.failures.clone()
    }
}

impl ManageConnection for ClusterConnectionManager {
    type Connection = ManagedConnection;
    type Error = RedisError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = self.client.get_connection()?;
        Ok(ManagedConnection::new(conn))
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if conn.ping() {
            Ok(())
        } else {
            self.failures.record();
            Err(io::Error::new(io::ErrorKind::ConnectionAborted, "PING failed on checkout").into())
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken || !conn.conn.is_open()
    }
}

/// Sends pool connection errors to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorHandler;

impl HandleError<RedisError> for TracingErrorHandler {
    fn handle_error(&self, error: RedisError) {
        warn!(error = %error, "Redis cluster pool connection error");
    }
}

/// What happens to a connection when the caller gives it back
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReturnPolicy {
    pub test_on_return: bool,
    pub max_idle: u32,
}

/// Connection checked out of the cluster pool
///
/// Derefs to [`ClusterConnection`], so commands run directly on it:
///
/// ```ignore
/// let mut conn = manager.get()?;
/// let _: () = redis::cmd("SET").arg("key").arg("value").query(&mut *conn)?;
/// ```
///
/// On drop the connection goes back to the pool, unless it fails the
/// test-on-return PING or the pool already holds `max_idle` idle connections.
pub struct ClusterConnectionGuard {
    conn: PooledConnection<ClusterConnectionManager>,
    pool: Pool<ClusterConnectionManager>,
    policy: ReturnPolicy,
}

impl ClusterConnectionGuard {
    pub(crate) fn new(
        conn: PooledConnection<ClusterConnectionManager>,
        pool: Pool<ClusterConnectionManager>,
        policy: ReturnPolicy,
    ) -> Self {
        Self { conn, pool, policy }
    }

    /// Close this connection instead of returning it to the pool
    pub fn mark_broken(&mut self) {
        self.conn.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.conn.broken
    }
}

impl Deref for ClusterConnectionGuard {
    type Target = ClusterConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn.conn
    }
}

impl DerefMut for ClusterConnectionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn.conn
    }
}

impl Drop for ClusterConnectionGuard {
    fn drop(&mut self) {
        if self.conn.broken {
            return;
        }

        if self.policy.test_on_return && !self.conn.ping() {
            warn!("Discarding Redis cluster connection that failed PING on return");
            self.conn.broken = true;
            return;
        }

        let idle = self.pool.state().idle_connections;
        if idle >= self.policy.max_idle {
            debug!(
                idle,
                max_idle = self.policy.max_idle,
                "Closing returned connection, pool is at max idle"
            );
            self.conn.broken = true;
        }
    }
}
