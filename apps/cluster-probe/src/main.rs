//! Cluster Probe
//!
//! Loads Redis cluster settings from a properties file or the environment,
//! connects, and reports on the cluster.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::Environment;
use eyre::{Result, WrapErr};
use redis_cluster::redis::{RedisClusterManager, check_health_detailed};
use tracing::info;

mod config;

#[derive(Parser)]
#[command(name = "cluster-probe")]
#[command(about = "Connect to a Redis cluster and report its health")]
struct Cli {
    /// Properties file with redis.* settings. Defaults to REDIS_* environment variables.
    #[arg(short, long, global = true)]
    properties: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run a health check
    Check,

    /// Print the parsed seed nodes
    Nodes,

    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();
    let config = config::load(cli.properties.as_deref())?;

    match cli.command {
        Commands::Check => {
            info!("Connecting to {} seed node(s)", config.nodes.len());
            let manager =
                RedisClusterManager::connect(config).wrap_err("Redis cluster connection failed")?;

            let status = check_health_detailed(&manager);
            println!("{}", serde_json::to_string_pretty(&status)?);

            if !status.healthy {
                eyre::bail!(
                    "Redis cluster is unhealthy: {}",
                    status.message.unwrap_or_default()
                );
            }
        }

        Commands::Nodes => {
            for node in &config.nodes {
                println!("{}", node);
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
