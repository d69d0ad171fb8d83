//! # Meridian Entity Server
//!
//! Authoritative host for a replicated octree of entities. Editors send
//! `AddEntity`/`EditEntity` packets over UDP; the server merges them into
//! its tree, hands out ids to newly created entities, steps the simulation
//! and snapshots the tree to disk.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! meridian
//!
//! # Specify custom configuration
//! meridian --config production.toml
//!
//! # Override specific settings
//! meridian --bind 0.0.0.0:40107 --data-file /var/lib/meridian/world.mrdn --log-level debug
//!
//! # JSON logging for production
//! meridian --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `meridian.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! SIGINT (Ctrl+C) and SIGTERM stop datagram intake and the simulation, then
//! write a final snapshot. A second signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the server from command-line arguments until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    args.apply_to(&mut config);

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{ConfigError, LoggingSettings, ServerSettings};
pub use server::{EntityServer, ServerStats};
