use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use core_config::{ConfigError, FromEnv, FromProperties, Properties};
use serde::Serialize;

use super::nodes::{NodeAddress, parse_nodes};
use crate::common::{ClusterError, ClusterResult};

/// Property keys read by [`ClusterConfig::from_properties`]
pub mod keys {
    pub const HOSTS: &str = "redis.hosts";
    pub const MAX_ACTIVE: &str = "redis.max.active";
    pub const MAX_IDLE: &str = "redis.max.idle";
    pub const MIN_IDLE: &str = "redis.min.idle";
    pub const TEST_ON_BORROW: &str = "redis.test.onBorrow";
    pub const TEST_ON_RETURN: &str = "redis.test.onReturn";
    pub const TEST_WHILE_IDLE: &str = "redis.test.whileIdle";
    pub const TESTS_PER_EVICTION: &str = "redis.test.numPerEviction";
    pub const TIME_BETWEEN_EVICTION: &str = "redis.time.betweenEviction";
    pub const IDLE_TIMEOUT: &str = "redis.idle.timeout";
    pub const MAX_WAIT: &str = "redis.max.wait";
    pub const TIMEOUT: &str = "redis.timeout";
    pub const MAX_ATTEMPTS: &str = "redis.max.attempts";
    pub const USERNAME: &str = "redis.username";
    pub const PASSWORD: &str = "redis.password";

    /// Every key above, used to collect properties from the environment
    pub const ALL: &[&str] = &[
        HOSTS,
        MAX_ACTIVE,
        MAX_IDLE,
        MIN_IDLE,
        TEST_ON_BORROW,
        TEST_ON_RETURN,
        TEST_WHILE_IDLE,
        TESTS_PER_EVICTION,
        TIME_BETWEEN_EVICTION,
        IDLE_TIMEOUT,
        MAX_WAIT,
        TIMEOUT,
        MAX_ATTEMPTS,
        USERNAME,
        PASSWORD,
    ];
}

/// Values used when a property is absent
pub mod defaults {
    pub const HOSTS: &str = "localhost:6379";
    pub const MAX_ACTIVE: u32 = 10;
    pub const MAX_IDLE: u32 = 5;
    pub const MIN_IDLE: u32 = 1;
    pub const TEST_ON_BORROW: bool = true;
    pub const TEST_ON_RETURN: bool = true;
    pub const TEST_WHILE_IDLE: bool = true;
    pub const TESTS_PER_EVICTION: i32 = 10;
    pub const TIME_BETWEEN_EVICTION_MS: i64 = 60_000;
    pub const IDLE_TIMEOUT_MS: u64 = 60_000;
    pub const MAX_WAIT_MS: u64 = 30_000;
    pub const TIMEOUT_MS: u64 = 2_000;
    pub const MAX_ATTEMPTS: u32 = 5;
}

/// Connection pool limits and health-check policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolConfig {
    /// Maximum connections handed out or idle at once
    pub max_active: u32,

    /// Idle connections beyond this are closed when returned
    pub max_idle: u32,

    /// Idle connections the pool keeps open and ready
    pub min_idle: u32,

    /// PING a connection before handing it out
    pub test_on_borrow: bool,

    /// PING a connection when it is given back
    pub test_on_return: bool,

    /// PING idle connections during eviction runs
    pub test_while_idle: bool,

    /// Idle connections tested per eviction run.
    /// A negative value `-n` tests one in every `n` idle connections.
    pub num_tests_per_eviction_run: i32,

    /// Interval between eviction runs; `<= 0` disables them
    pub time_between_eviction_runs_ms: i64,

    /// Idle connections older than this are closed; `0` keeps them forever
    pub idle_timeout_ms: u64,

    /// How long a checkout waits for a free connection
    pub max_wait_ms: u64,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_active(mut self, max_active: u32) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn with_max_idle(mut self, max_idle: u32) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_min_idle(mut self, min_idle: u32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    pub fn with_test_while_idle(mut self, enabled: bool) -> Self {
        self.test_while_idle = enabled;
        self
    }

    pub fn with_num_tests_per_eviction_run(mut self, n: i32) -> Self {
        self.num_tests_per_eviction_run = n;
        self
    }

    pub fn with_time_between_eviction_runs(mut self, millis: i64) -> Self {
        self.time_between_eviction_runs_ms = millis;
        self
    }

    pub fn with_idle_timeout(mut self, millis: u64) -> Self {
        self.idle_timeout_ms = millis;
        self
    }

    pub fn with_max_wait(mut self, millis: u64) -> Self {
        self.max_wait_ms = millis;
        self
    }

    /// Check that the limits are consistent with each other
    ///
    /// # Returns
    /// * `Ok(())` when `1 <= max_active`, `min_idle <= max_idle <= max_active`
    ///   and `max_wait_ms > 0`
    /// * `Err(ClusterError::InvalidPoolConfig)` describing the first violation
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_active == 0 {
            return Err(ClusterError::InvalidPoolConfig(
                "max_active must be at least 1".to_string(),
            ));
        }
        if self.max_idle > self.max_active {
            return Err(ClusterError::InvalidPoolConfig(format!(
                "max_idle ({}) exceeds max_active ({})",
                self.max_idle, self.max_active
            )));
        }
        if self.max_wait_ms == 0 {
            return Err(ClusterError::InvalidPoolConfig(
                "max_wait must be greater than zero".to_string(),
            ));
        }
        if self.min_idle > self.max_idle {
            return Err(ClusterError::InvalidPoolConfig(format!(
                "min_idle ({}) exceeds max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        Ok(())
    }

    /// Number of idle connections an eviction run should test
    ///
    /// # Arguments
    /// * `idle` - Idle connections in the pool when the run starts
    ///
    /// # Example
    /// ```ignore
    /// let pool = PoolConfig::new().with_num_tests_per_eviction_run(-3);
    /// assert_eq!(pool.tests_for_idle(7), 3);
    /// ```
    pub fn tests_for_idle(&self, idle: usize) -> usize {
        let n = self.num_tests_per_eviction_run;
        if n >= 0 {
            (n as usize).min(idle)
        } else {
            idle.div_ceil(n.unsigned_abs() as usize)
        }
    }

    /// Period of the idle-connection test job, if it should run at all
    pub fn eviction_interval(&self) -> Option<Duration> {
        if self.test_while_idle && self.time_between_eviction_runs_ms > 0 {
            Some(Duration::from_millis(self.time_between_eviction_runs_ms as u64))
        } else {
            None
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: defaults::MAX_ACTIVE,
            max_idle: defaults::MAX_IDLE,
            min_idle: defaults::MIN_IDLE,
            test_on_borrow: defaults::TEST_ON_BORROW,
            test_on_return: defaults::TEST_ON_RETURN,
            test_while_idle: defaults::TEST_WHILE_IDLE,
            num_tests_per_eviction_run: defaults::TESTS_PER_EVICTION,
            time_between_eviction_runs_ms: defaults::TIME_BETWEEN_EVICTION_MS,
            idle_timeout_ms: defaults::IDLE_TIMEOUT_MS,
            max_wait_ms: defaults::MAX_WAIT_MS,
        }
    }
}

impl FromProperties for PoolConfig {
    fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        Ok(Self {
            max_active: props.parse_or(keys::MAX_ACTIVE, defaults::MAX_ACTIVE)?,
            max_idle: props.parse_or(keys::MAX_IDLE, defaults::MAX_IDLE)?,
            min_idle: props.parse_or(keys::MIN_IDLE, defaults::MIN_IDLE)?,
            test_on_borrow: props.parse_bool_or(keys::TEST_ON_BORROW, defaults::TEST_ON_BORROW)?,
            test_on_return: props.parse_bool_or(keys::TEST_ON_RETURN, defaults::TEST_ON_RETURN)?,
            test_while_idle: props
                .parse_bool_or(keys::TEST_WHILE_IDLE, defaults::TEST_WHILE_IDLE)?,
            num_tests_per_eviction_run: props
                .parse_or(keys::TESTS_PER_EVICTION, defaults::TESTS_PER_EVICTION)?,
            time_between_eviction_runs_ms: props
                .parse_or(keys::TIME_BETWEEN_EVICTION, defaults::TIME_BETWEEN_EVICTION_MS)?,
            idle_timeout_ms: props.parse_or(keys::IDLE_TIMEOUT, defaults::IDLE_TIMEOUT_MS)?,
            max_wait_ms: props.parse_or(keys::MAX_WAIT, defaults::MAX_WAIT_MS)?,
        })
    }
}

/// Redis cluster connection settings
///
/// Can be built in code, from a [`Properties`] map, or from environment
/// variables named after the property keys (`redis.hosts` -> `REDIS_HOSTS`).
///
/// # Example
///
/// ```ignore
/// use redis_cluster::redis::ClusterConfig;
///
/// let props = Properties::parse("redis.hosts=10.0.0.1:7000,10.0.0.2:7001");
/// let config = ClusterConfig::from_properties(&props)?;
/// ```
#[derive(Clone, Serialize)]
pub struct ClusterConfig {
    /// Seed nodes used to discover the cluster topology
    pub nodes: BTreeSet<NodeAddress>,

    pub pool: PoolConfig,

    /// Connect and response timeout for each node connection
    pub timeout_ms: u64,

    /// Tries per command, the first one included, across redirections and
    /// reconnects
    pub max_attempts: u32,

    /// Optional username for Redis ACL
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(skip)]
    pub password: Option<String>,
}

impl ClusterConfig {
    pub fn new(nodes: BTreeSet<NodeAddress>) -> Self {
        Self {
            nodes,
            pool: PoolConfig::default(),
            timeout_ms: defaults::TIMEOUT_MS,
            max_attempts: defaults::MAX_ATTEMPTS,
            username: None,
            password: None,
        }
    }

    /// Build from a comma-separated `host:port` list with default pool settings
    pub fn from_hosts(hosts: &str) -> ClusterResult<Self> {
        Ok(Self::new(parse_nodes(hosts)?))
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_auth(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.timeout_ms = millis;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Read every setting from `props`, falling back to the defaults.
    ///
    /// Unlike [`FromProperties::from_properties`] this also reports malformed
    /// host lists as [`ClusterError::InvalidNode`].
    ///
    /// # Arguments
    /// * `props` - Map holding any of the [`keys`]
    ///
    /// # Returns
    /// * `Ok(ClusterConfig)` with unset keys taken from [`defaults`]
    /// * `Err(ClusterError::InvalidNode)` for a malformed `redis.hosts`
    /// * `Err(ClusterError::Config)` for any other value that does not parse
    pub fn parse_properties(props: &Properties) -> ClusterResult<Self> {
        let nodes = parse_nodes(props.get_or(keys::HOSTS, defaults::HOSTS))?;

        Ok(Self {
            nodes,
            pool: PoolConfig::from_properties(props)?,
            timeout_ms: props.parse_or(keys::TIMEOUT, defaults::TIMEOUT_MS)?,
            max_attempts: props.parse_or(keys::MAX_ATTEMPTS, defaults::MAX_ATTEMPTS)?,
            username: props.get_non_empty(keys::USERNAME).map(str::to_string),
            password: props.get_non_empty(keys::PASSWORD).map(str::to_string),
        })
    }

    /// Load from environment variables such as `REDIS_HOSTS`, `REDIS_MAX_ACTIVE`
    pub fn load_env() -> ClusterResult<Self> {
        Self::parse_properties(&Properties::from_env(keys::ALL.iter().copied()))
    }

    /// Node URLs handed to the cluster client builder
    pub fn redis_urls(&self) -> Vec<String> {
        self.nodes.iter().map(NodeAddress::redis_url).collect()
    }

    /// Retries the cluster client makes after a command's first try
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.nodes.is_empty() {
            return Err(ClusterError::InvalidNode(
                "at least one cluster node is required".to_string(),
            ));
        }
        self.pool.validate()
    }
}

impl FromProperties for ClusterConfig {
    fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        Self::parse_properties(props).map_err(|e| match e {
            ClusterError::Config(inner) => inner,
            other => ConfigError::ParseError {
                key: keys::HOSTS.to_string(),
                details: other.to_string(),
            },
        })
    }
}

impl FromEnv for ClusterConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_properties(&Properties::from_env(keys::ALL.iter().copied()))
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new(BTreeSet::from([NodeAddress::new("localhost", 6379)]))
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("nodes", &self.nodes)
            .field("pool", &self.pool)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_attempts", &self.max_attempts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_defaults_from_empty_properties() {
        let config = ClusterConfig::parse_properties(&Properties::new()).unwrap();

        assert_eq!(config.nodes.len(), 1);
        assert!(config.nodes.contains(&NodeAddress::new("localhost", 6379)));
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.timeout_ms, 2_000);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.username, None);
        assert_eq!(config.password, None);
    }

    #[test]
    fn test_pool_defaults() {
        let pool = PoolConfig::default();
        assert_eq!(pool.max_active, 10);
        assert_eq!(pool.max_idle, 5);
        assert_eq!(pool.min_idle, 1);
        assert!(pool.test_on_borrow);
        assert!(pool.test_on_return);
        assert!(pool.test_while_idle);
        assert_eq!(pool.num_tests_per_eviction_run, 10);
        assert_eq!(pool.time_between_eviction_runs_ms, 60_000);
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_defaults_agree_with_constants() {
        let config = ClusterConfig::default();
        assert_eq!(config.pool.max_idle, defaults::MAX_IDLE);
        assert_eq!(config.pool.max_wait_ms, defaults::MAX_WAIT_MS);
        assert_eq!(config.timeout_ms, defaults::TIMEOUT_MS);
        assert_eq!(config.max_attempts, defaults::MAX_ATTEMPTS);
        assert_eq!(
            config.nodes,
            parse_nodes(defaults::HOSTS).unwrap(),
        );
    }

    #[test]
    fn test_retries_exclude_first_attempt() {
        let config = ClusterConfig::default();
        assert_eq!(config.retries(), 4);
        assert_eq!(config.clone().with_max_attempts(1).retries(), 0);
        assert_eq!(config.with_max_attempts(0).retries(), 0);
    }

    #[test]
    fn test_all_properties() {
        let config = ClusterConfig::parse_properties(&props(&[
            (keys::HOSTS, "a:7000, b:7001"),
            (keys::MAX_ACTIVE, "50"),
            (keys::MAX_IDLE, "20"),
            (keys::MIN_IDLE, "4"),
            (keys::TEST_ON_BORROW, "false"),
            (keys::TEST_ON_RETURN, "false"),
            (keys::TEST_WHILE_IDLE, "false"),
            (keys::TESTS_PER_EVICTION, "-2"),
            (keys::TIME_BETWEEN_EVICTION, "1000"),
            (keys::IDLE_TIMEOUT, "0"),
            (keys::MAX_WAIT, "500"),
            (keys::TIMEOUT, "750"),
            (keys::MAX_ATTEMPTS, "3"),
            (keys::USERNAME, "app"),
            (keys::PASSWORD, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.redis_urls(), vec!["redis://a:7000", "redis://b:7001"]);
        assert_eq!(config.pool.max_active, 50);
        assert_eq!(config.pool.max_idle, 20);
        assert_eq!(config.pool.min_idle, 4);
        assert!(!config.pool.test_on_borrow);
        assert!(!config.pool.test_on_return);
        assert!(!config.pool.test_while_idle);
        assert_eq!(config.pool.num_tests_per_eviction_run, -2);
        assert_eq!(config.pool.time_between_eviction_runs_ms, 1000);
        assert_eq!(config.pool.idle_timeout(), None);
        assert_eq!(config.pool.max_wait(), Duration::from_millis(500));
        assert_eq!(config.timeout(), Duration::from_millis(750));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.username.as_deref(), Some("app"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_bad_number_reports_key() {
        let err = ClusterConfig::parse_properties(&props(&[(keys::MIN_IDLE, "two")])).unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
        assert!(err.to_string().contains(keys::MIN_IDLE));
    }

    #[test]
    fn test_bad_bool_reports_key() {
        let err =
            ClusterConfig::parse_properties(&props(&[(keys::TEST_ON_RETURN, "sometimes")]))
                .unwrap_err();
        assert!(err.to_string().contains(keys::TEST_ON_RETURN));
    }

    #[test]
    fn test_bad_hosts() {
        let err = ClusterConfig::parse_properties(&props(&[(keys::HOSTS, "a:1,b")])).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidNode(_)));

        let err = ClusterConfig::from_properties(&props(&[(keys::HOSTS, "a:1,b")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == keys::HOSTS));
    }

    #[test]
    fn test_blank_password_is_none() {
        let config = ClusterConfig::parse_properties(&props(&[(keys::PASSWORD, "  ")])).unwrap();
        assert_eq!(config.password, None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ClusterConfig::default().with_auth(None, Some("hunter2".to_string()));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("REDIS_HOSTS", Some("10.0.0.1:7000,10.0.0.2:7000")),
                ("REDIS_MAX_ACTIVE", Some("16")),
                ("REDIS_TEST_ONBORROW", Some("false")),
                ("REDIS_MIN_IDLE", None),
            ],
            || {
                let config = ClusterConfig::from_env().unwrap();
                assert_eq!(config.nodes.len(), 2);
                assert_eq!(config.pool.max_active, 16);
                assert!(!config.pool.test_on_borrow);
                assert_eq!(config.pool.min_idle, 1);
            },
        );
    }

    #[test]
    fn test_load_env_invalid_number() {
        temp_env::with_var("REDIS_TIME_BETWEENEVICTION", Some("soon"), || {
            let err = ClusterConfig::load_env().unwrap_err();
            assert!(err.to_string().contains(keys::TIME_BETWEEN_EVICTION));
        });
    }

    #[test]
    fn test_validate_limits() {
        assert!(PoolConfig::new().with_max_active(0).validate().is_err());
        assert!(
            PoolConfig::new()
                .with_max_active(4)
                .with_max_idle(8)
                .validate()
                .is_err()
        );
        let err = PoolConfig::new()
            .with_max_idle(2)
            .with_min_idle(3)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("min_idle"));
        assert!(PoolConfig::new().with_max_wait(0).validate().is_err());

        let config = ClusterConfig::new(BTreeSet::new());
        assert!(matches!(config.validate(), Err(ClusterError::InvalidNode(_))));
    }

    #[test]
    fn test_tests_for_idle() {
        let pool = PoolConfig::new().with_num_tests_per_eviction_run(3);
        assert_eq!(pool.tests_for_idle(10), 3);
        assert_eq!(pool.tests_for_idle(2), 2);
        assert_eq!(pool.tests_for_idle(0), 0);

        let pool = PoolConfig::new().with_num_tests_per_eviction_run(-4);
        assert_eq!(pool.tests_for_idle(10), 3);
        assert_eq!(pool.tests_for_idle(4), 1);
        assert_eq!(pool.tests_for_idle(0), 0);

        let pool = PoolConfig::new().with_num_tests_per_eviction_run(0);
        assert_eq!(pool.tests_for_idle(10), 0);
    }

    #[test]
    fn test_eviction_interval() {
        let pool = PoolConfig::new();
        assert_eq!(pool.eviction_interval(), Some(Duration::from_secs(60)));

        let pool = PoolConfig::new().with_time_between_eviction_runs(-1);
        assert_eq!(pool.eviction_interval(), None);

        let pool = PoolConfig::new().with_test_while_idle(false);
        assert_eq!(pool.eviction_interval(), None);
    }
}
