//! Configuration loading for the probe

use std::path::Path;

use core_config::Properties;
use eyre::{Result, WrapErr};
use redis_cluster::redis::ClusterConfig;
use tracing::debug;

/// Read cluster settings from `path`, or from `REDIS_*` variables when no file is given
pub fn load(path: Option<&Path>) -> Result<ClusterConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading Redis cluster properties");
            let properties = Properties::load(path)?;
            ClusterConfig::parse_properties(&properties)
                .wrap_err_with(|| format!("Invalid settings in {}", path.display()))
        }
        None => {
            debug!("Loading Redis cluster settings from environment");
            ClusterConfig::load_env().wrap_err("Invalid REDIS_* environment settings")
        }
    }
}
