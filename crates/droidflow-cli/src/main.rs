mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Droidflow -- local-first Android automation with human-auth handoff.
#[derive(Parser, Debug)]
#[command(name = "droidflow", version, about)]
struct Cli {
    /// Runtime home directory (defaults to $DROIDFLOW_HOME or ~/.droidflow)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the home directory layout and a default droidflow.toml
    Init,

    /// Run a task against the connected device
    Run {
        /// What the agent should accomplish
        #[arg(long)]
        goal: String,

        /// Override the configured step ceiling
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Human-auth relay subcommands
    Relay {
        #[command(subcommand)]
        action: RelayCommands,
    },

    /// List adb-visible devices
    Devices,
}

#[derive(Subcommand, Debug)]
enum RelayCommands {
    /// Run the relay server in the foreground
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with env filter (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let home = cli
        .home
        .unwrap_or_else(droidflow_types::config::resolve_home_dir);

    match cli.command {
        Commands::Init => commands::init(&home),
        Commands::Run { goal, max_steps } => commands::run_task(&home, &goal, max_steps).await,
        Commands::Relay { action } => match action {
            RelayCommands::Serve { listen } => commands::relay_serve(&home, listen).await,
        },
        Commands::Devices => commands::list_devices(&home).await,
    }
}
