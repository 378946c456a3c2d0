//! kubeinteract CLI: the main entry point.
//!
//! Commands:
//! - `interact`: Talk to your cluster through the model (REPL or `--query`)
//! - `models`: List the models served by the configured endpoint
//! - `doctor`: Diagnose configuration and environment

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod commands;

#[derive(Parser)]
#[command(
    name = "kubeinteract",
    about = "kubeinteract: operate a Kubernetes cluster through an LLM",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session with the model
    Interact(commands::interact::InteractArgs),

    /// List the models available at the configured endpoint
    Models {
        #[command(flatten)]
        endpoint: commands::EndpointArgs,
    },

    /// Diagnose configuration and environment
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The UI owns stdout, logs go to stderr
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Interact(args) => commands::interact::run(args, cancel).await?,
        Commands::Models { endpoint } => commands::models::run(endpoint).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
