//! Periodic PING of idle pooled connections
//!
//! r2d2 only validates connections on checkout and reaps them by age. The
//! eviction job adds test-while-idle: every run it takes a number of idle
//! connections out of the pool, PINGs them, and lets the pool discard the
//! ones that failed. r2d2 then refills the pool up to `min_idle`.
//!
//! r2d2 hands idle connections out last-in first-out, so a run that tests
//! fewer connections than are idle always reaches the most recently returned
//! ones. Connections that stay below them are closed by `idle_timeout`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use metrics::{counter, gauge};
use r2d2::Pool;
use scheduled_thread_pool::{JobHandle, ScheduledThreadPool};
use tracing::{debug, warn};

use super::config::PoolConfig;
use super::pool::{CheckoutFailures, ClusterConnectionManager};

/// Outcome of a single eviction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionRun {
    pub tested: usize,
    pub evicted: usize,
}

/// Cancels the scheduled eviction job when dropped
pub struct EvictionHandle {
    job: JobHandle,
    interval: Duration,
}

impl EvictionHandle {
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for EvictionHandle {
    fn drop(&mut self) {
        debug!("Stopping Redis cluster eviction job");
        self.job.cancel();
    }
}

/// Schedule eviction runs on `thread_pool`, if the config asks for them
///
/// The job holds only a weak reference to `pool`, so dropping the last
/// strong reference closes the pooled connections without waiting for the
/// next tick.
pub(crate) fn start(
    pool: &Arc<Pool<ClusterConnectionManager>>,
    failures: CheckoutFailures,
    config: &PoolConfig,
    thread_pool: &ScheduledThreadPool,
) -> Option<EvictionHandle> {
    let interval = config.eviction_interval()?;
    let config = config.clone();
    let pool: Weak<Pool<ClusterConnectionManager>> = Arc::downgrade(pool);

    let job = thread_pool.execute_at_fixed_rate(interval, interval, move || {
        if let Some(pool) = pool.upgrade() {
            run_once(&pool, &failures, &config);
        }
    });

    debug!(interval_ms = interval.as_millis() as u64, "Started Redis cluster eviction job");
    Some(EvictionHandle { job, interval })
}

/// Test up to [`PoolConfig::tests_for_idle`] idle connections.
///
/// # Arguments
/// * `pool` - Pool to take idle connections from
/// * `failures` - Checkout failure count of the pool's connection manager
/// * `config` - Supplies the number of connections to test and whether
///   checkout already PINGs them
///
/// # Returns
/// How many connections were tested and how many of those were dead. With
/// `test_on_borrow` the checkout itself PINGs and drops dead connections;
/// those are counted from `failures`, which also picks up checkouts by other
/// callers that fail during the run.
///
/// Uses `try_get`, so a run never waits on a busy pool.
pub fn run_once(
    pool: &Pool<ClusterConnectionManager>,
    failures: &CheckoutFailures,
    config: &PoolConfig,
) -> EvictionRun {
    let state = pool.state();
    let wanted = config.tests_for_idle(state.idle_connections as usize);
    let failed_before = failures.count();

    let mut checked = Vec::with_capacity(wanted);
    while checked.len() < wanted {
        match pool.try_get() {
            Some(conn) => checked.push(conn),
            None => break,
        }
    }

    let dropped_on_checkout = failures.count().saturating_sub(failed_before);
    let mut run = EvictionRun {
        tested: checked.len() + dropped_on_checkout,
        evicted: dropped_on_checkout,
    };

    if !config.test_on_borrow {
        for conn in checked.iter_mut() {
            if !conn.ping() {
                conn.broken = true;
                run.evicted += 1;
            }
        }
    }
    drop(checked);

    let state = pool.state();
    gauge!("redis_cluster_pool_connections").set(state.connections as f64);
    gauge!("redis_cluster_pool_idle_connections").set(state.idle_connections as f64);
    counter!("redis_cluster_pool_evicted_total").increment(run.evicted as u64);

    if run.evicted > 0 {
        warn!(
            tested = run.tested,
            evicted = run.evicted,
            "Evicted idle Redis cluster connections that failed PING"
        );
    } else {
        debug!(tested = run.tested, "Eviction run found no dead connections");
    }

    run
}
