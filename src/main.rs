//! # loggather CLI
//!
//! One binary plays either role: the harvesting client on the source host,
//! or the collector that receives and archives chunks.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `loggather client` | Run harvest cycles on the configured interval |
//! | `loggather client --once` | Run a single harvest cycle and exit |
//! | `loggather server` | Start the collector HTTP server |
//! | `loggather offsets` | Print the persisted offset table |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loggather::config;
use loggather::coordinator::Coordinator;
use loggather::offsets::OffsetStore;
use loggather::server;

/// loggather — incremental log harvester and collector.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with `[client]` and/or `[server]` sections.
#[derive(Parser)]
#[command(
    name = "loggather",
    about = "loggather — ship growing log files to a remote collector",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./conf/loggather.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the watched directory and ship new bytes to the collector.
    ///
    /// Loads the offset document (a malformed document is fatal), then runs
    /// a cycle every `client.interval_secs` seconds.
    Client {
        /// Run exactly one cycle, persist offsets, and exit.
        #[arg(long)]
        once: bool,
    },

    /// Start the collector HTTP server.
    ///
    /// Binds to `[server].bind` and appends received chunks under
    /// `[server].storage_dir`.
    Server,

    /// Print the persisted offset table.
    Offsets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loggather=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Client { once } => {
            let client = cfg.client()?;
            let offsets = Arc::new(
                OffsetStore::load(&client.offset_file).context("Cannot start harvesting")?,
            );
            let coordinator = Coordinator::from_config(client, offsets)?;

            if once {
                let report = coordinator.run_cycle().await?;
                println!("harvest {}", client.watch_dir.display());
                println!("  discovered: {}", report.discovered);
                println!("  succeeded: {}", report.succeeded);
                println!("  failed: {}", report.failed);
                println!("  bytes shipped: {}", report.bytes_shipped);
                println!("  offsets persisted: {}", report.persisted);
            } else {
                tokio::select! {
                    res = coordinator.run() => res?,
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("interrupted, exiting");
                    }
                }
            }
        }
        Commands::Server => {
            server::run_server(&cfg).await?;
        }
        Commands::Offsets => {
            let client = cfg.client()?;
            let offsets = OffsetStore::load(&client.offset_file)?;
            println!("{:<40} OFFSET", "FILE");
            for record in offsets.records() {
                println!("{:<40} {}", record.file_name, record.offset);
            }
        }
    }

    Ok(())
}
