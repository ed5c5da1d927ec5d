//! Brook CLI - Headless Progressive-Download Client
//!
//! Features:
//! - Probe a resource for size, content type and range support
//! - Fetch a byte range while the download streams in
//! - Watch download progress events

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Brook CLI - progressive-download toolkit
#[derive(Parser)]
#[command(name = "brook-cli")]
#[command(version)]
#[command(about = "Probe resources and fetch byte ranges through the Brook cache", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a resource's metadata (size, content type, range support)
    Probe {
        /// Resource URL
        url: String,
    },

    /// Fetch a byte range, writing it to a file or stdout
    Fetch {
        /// Resource URL
        url: String,

        /// Starting byte offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Number of bytes to fetch (defaults to the rest of the resource)
        #[arg(short, long)]
        length: Option<u64>,

        /// Output file (stdout when omitted)
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },

    /// Stream a resource and print progress events as JSON lines
    Watch {
        /// Resource URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Probe { url } => {
            commands::probe(&url).await?;
        }
        Commands::Fetch {
            url,
            offset,
            length,
            output,
        } => {
            commands::fetch(&url, offset, length, output).await?;
        }
        Commands::Watch { url } => {
            commands::watch(&url).await?;
        }
    }

    Ok(())
}
