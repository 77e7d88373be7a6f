//! Switchyard CLI entrypoint.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod simulator;

use config::SwitchyardConfig;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(author, version, about = "Switchyard agent coordination layer", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "switchyard.yaml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload against simulated agents
    Simulate {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 100)]
        tasks: usize,

        /// Seed for simulated failures and task mix
        #[arg(long)]
        seed: Option<u64>,

        /// Publish events to this NATS server
        #[arg(long)]
        nats_url: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Print the effective configuration
    ShowConfig,
}

fn init_logging(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = SwitchyardConfig::load(Some(&cli.config))?;

    match cli.command {
        Commands::Simulate {
            tasks,
            seed,
            nats_url,
        } => handlers::simulate(config, tasks, seed, nats_url).await?,
        Commands::Validate => handlers::validate(&config, &cli.config)?,
        Commands::ShowConfig => handlers::show_config(&config)?,
    }

    Ok(())
}
