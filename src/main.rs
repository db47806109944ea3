//! hubup - adapter-library update manager CLI

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hubup::cmd;

#[derive(Parser)]
#[command(name = "hubup")]
#[command(author, version, about = "Adapter-library update orchestration for the hub")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the remote source for new library versions
    Check {
        /// Limit the check to specific libraries (default: all tracked)
        libraries: Vec<String>,
    },
    /// Update a library to its latest compatible version
    Upgrade {
        /// Library name
        library: String,
    },
    /// Show the current update operation and the last outcome
    Status,
    /// View the update audit history
    History {
        /// Only entries for this library
        #[arg(long)]
        library: Option<String>,
        /// Only failed updates
        #[arg(long, conflicts_with = "ok")]
        failed: bool,
        /// Only successful updates
        #[arg(long)]
        ok: bool,
        /// Maximum number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { libraries } => cmd::check::check(&libraries).await,
        Commands::Upgrade { library } => cmd::upgrade::upgrade(&library).await,
        Commands::Status => cmd::status::status().await,
        Commands::History {
            library,
            failed,
            ok,
            limit,
        } => cmd::history::history(library, failed, ok, limit).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "hubup", &mut std::io::stdout());
            Ok(())
        }
    }
}
