//! Main application logic and lifecycle management.
//!
//! [`Application`] owns the validated configuration and, once run, the shared
//! entity tree and every task working on it: the persistence worker, the UDP
//! receive loop and the simulation tick.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::server::{spawn_simulation, EntityServer};
use crate::signals::{setup_signal_handlers, wait_for_termination_signal};
use meridian_replication::{EntityTree, PersistWorker, ShutdownState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long each task gets to finish after shutdown is initiated.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(8);

pub struct Application {
    config: AppConfig,
    config_path: PathBuf,
}

impl Application {
    /// Loads configuration, applies CLI overrides and validates the result.
    ///
    /// A missing configuration file is created with default settings.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        args.apply_to(&mut config);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        Ok(Self {
            config,
            config_path: args.config_path,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs every task until a termination signal arrives, then stops them in
    /// order and writes the final snapshot.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Meridian Entity Server");
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();
        let tree = Arc::new(RwLock::new(EntityTree::new(self.config.tree.clone())));

        let persist_handle = if self.config.persist.enabled {
            let worker = PersistWorker::new(tree.clone(), self.config.persist.clone());
            Some(worker.spawn(shutdown_state.clone()))
        } else {
            info!("💾 Persistence disabled - entities will not survive a restart");
            None
        };

        let server = match EntityServer::bind(
            self.config.bind_address()?,
            tree.clone(),
            self.config.server.max_datagram_size,
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                error!("❌ Failed to bind {}: {}", self.config.server.bind_address, e);
                shutdown_state.initiate_shutdown();
                await_task("persistence", persist_handle).await;
                return Err(e.into());
            }
        };
        let server_handle = tokio::spawn(server.run(shutdown_state.clone()));

        let simulation_handle = match self.config.server.tick_interval_ms {
            0 => {
                info!("⏱️ Simulation tick disabled");
                None
            }
            ms => Some(spawn_simulation(
                tree.clone(),
                Duration::from_millis(ms),
                shutdown_state.clone(),
            )),
        };

        info!("✅ Meridian is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers(&shutdown_state).await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_termination_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping datagram intake...");
        if let Some(stats) = await_task("entity server", Some(server_handle)).await {
            info!(
                "  - {} datagrams, {} entities created, {} responses sent",
                stats.datagrams_received, stats.entities_created, stats.responses_sent
            );
        }

        info!("⏳ Phase 2: Stopping simulation...");
        await_task("simulation", simulation_handle).await;

        info!("💾 Phase 3: Writing final snapshot...");
        if let Some(saves) = await_task("persistence", persist_handle).await {
            info!("  - {} snapshots written this run", saves);
        }

        shutdown_state.complete_shutdown();

        let tree = tree.read().await;
        info!("📊 Final Statistics:");
        info!("  - Entities: {}", tree.entity_count());
        info!("  - Octree nodes: {}", tree.node_count());
        info!("✅ Meridian shutdown complete");

        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  📂 Config file: {}", self.config_path.display());
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🌍 World: {} units, max depth {}, {:?}",
            self.config.tree.root_scale, self.config.tree.max_depth, self.config.tree.role
        );
        info!("  ⏱️ Tick interval: {}ms", self.config.server.tick_interval_ms);
        if self.config.persist.enabled {
            info!(
                "  💾 Snapshot: {} every {}ms",
                self.config.persist.path.display(),
                self.config.persist.interval_ms
            );
        }
    }
}

/// Waits for a task to finish, giving up after [`TASK_SHUTDOWN_TIMEOUT`].
async fn await_task<T>(name: &str, handle: Option<JoinHandle<T>>) -> Option<T> {
    let handle = handle?;
    match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            error!("❌ {} task failed: {}", name, e);
            None
        }
        Err(_) => {
            warn!("⏰ {} task did not complete within timeout", name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(config_path: PathBuf) -> CliArgs {
        CliArgs {
            config_path,
            bind_address: Some("127.0.0.1:0".to_string()),
            log_level: None,
            json_logs: false,
            data_file: None,
        }
    }

    #[tokio::test]
    async fn test_application_creation_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let mut args = args(dir.path().join("meridian.toml"));
        args.data_file = Some(dir.path().join("world.mrdn"));

        let app = Application::new(args).await.unwrap();
        assert!(dir.path().join("meridian.toml").exists());
        assert_eq!(app.config().server.bind_address, "127.0.0.1:0");
        assert_eq!(app.config().persist.path, dir.path().join("world.mrdn"));
    }

    #[tokio::test]
    async fn test_invalid_override_fails_validation() {
        let dir = TempDir::new().unwrap();
        let mut args = args(dir.path().join("meridian.toml"));
        args.log_level = Some("chatty".to_string());

        assert!(Application::new(args).await.is_err());
    }
}
