//! mesh CLI
//!
//! Pushes the current directory to every host of a cluster, launches a job
//! on all of them at once, and streams the first host's output back.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mesh_cli::commands::{self, ConfigPaths};
use mesh_cli::output::print_error;

#[derive(Parser)]
#[command(name = "mesh")]
#[command(author, version, about = "Run jobs across a cluster of hosts over SSH")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the cluster file (default: ~/.config/mesh/cluster.yaml)
    #[arg(long, global = true, env = "MESH_CLUSTERS")]
    clusters: Option<PathBuf>,

    /// Path to the job spec (default: ./mesh.yaml)
    #[arg(long, global = true)]
    job: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the workspace to every host, launch a command and follow its output
    Run {
        /// Cluster name from the cluster file
        cluster: String,
        /// Command to launch on every host
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
        /// Directory to copy (default: current directory)
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Run the job spec's setup commands on every host
    Setup {
        /// Cluster name from the cluster file
        cluster: String,
    },

    /// Show live TPU utilization for a cluster
    Watch {
        /// Cluster name from the cluster file
        cluster: String,
        /// Seconds between refreshes
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
        /// Print one snapshot and exit
        #[arg(long)]
        once: bool,
    },

    /// List configured clusters
    Clusters,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = dispatch(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let paths = ConfigPaths::new(cli.clusters, cli.job);

    match cli.command {
        Commands::Run {
            cluster,
            command,
            workspace,
        } => {
            commands::run_command(&paths, &cluster, &command, workspace).await?;
        }

        Commands::Setup { cluster } => {
            commands::setup_command(&paths, &cluster).await?;
        }

        Commands::Watch {
            cluster,
            interval,
            once,
        } => {
            let interval = Duration::from_secs(interval.max(1));
            commands::watch_command(&paths, &cluster, interval, once).await?;
        }

        Commands::Clusters => {
            commands::clusters_command(&paths)?;
        }
    }

    Ok(())
}
