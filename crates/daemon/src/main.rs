//! WebTerm Daemon
//!
//! Embedded web terminal service: PTY shell sessions over WebSocket.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use daemon::config::Config;
use daemon::network::serve;
use daemon::terminal::TerminalSubsystem;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// WebTerm daemon - PTY shell sessions over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "webterm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the WebTerm daemon
    Start {
        /// Listen address override, e.g. 127.0.0.1:5261
        #[arg(long)]
        listen: Option<String>,
    },

    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("WebTerm daemon starting...");
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    match cli.command {
        Commands::Check => {
            config.validate()?;
            println!("Configuration OK");
            Ok(())
        }

        Commands::Start { listen } => {
            if let Some(listen) = listen {
                config.network.listen_addr = listen;
            }
            config.validate()?;

            let subsystem = TerminalSubsystem::init(&config.terminal)?;
            let listener = TcpListener::bind(&config.network.listen_addr).await?;
            let shutdown = CancellationToken::new();

            let server = tokio::spawn(serve(listener, subsystem.gateway(), shutdown.clone()));

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown signal received");

            shutdown.cancel();
            let _ = server.await;
            subsystem.shutdown().await;

            Ok(())
        }
    }
}
