//! # Quantum-Chain Node Runtime
//!
//! Runs the Block Sync subsystem (qc-18) over in-memory collaborators.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration from the environment
//! 3. Wire the sync container
//! 4. Start the sync worker and the event logger
//! 5. Run until Ctrl+C, then shut down

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{load_config, SyncContainer};
use qc_18_block_sync::{BlockSyncApi, SyncEvent};
use shared_types::short_hex;

/// The node runtime.
struct NodeRuntime {
    container: Arc<SyncContainer>,
    event_logger: Option<JoinHandle<()>>,
}

impl NodeRuntime {
    fn new(container: SyncContainer) -> Self {
        Self {
            container: Arc::new(container),
            event_logger: None,
        }
    }

    async fn start(&mut self) -> Result<()> {
        info!("===========================================");
        info!("  Quantum-Chain Node Runtime v{}", qc_18_block_sync::VERSION);
        info!("  Subsystem: Block Sync (qc-18)");
        info!("===========================================");

        let events = self.container.service.subscribe();
        self.event_logger = Some(tokio::spawn(log_events(events)));

        let initial_sync = self.container.config.initial_sync;
        self.container
            .service
            .start(initial_sync)
            .await
            .context("Failed to start block sync")?;

        info!("Local height: {}", self.container.service.local_height());
        info!("Phase: {:?}", self.container.service.phase());
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");
        self.container.service.shutdown();
        if let Some(handle) = self.event_logger.take() {
            handle.abort();
        }

        let (blocks, transactions) = self.container.service.outstanding_requests();
        info!(
            "Final height {}, {} pending, {} block / {} transaction requests outstanding",
            self.container.service.local_height(),
            self.container.service.pending_count(),
            blocks,
            transactions
        );
        info!("Shutdown complete");
    }
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<SyncEvent>) {
    loop {
        match events.recv().await {
            Ok(SyncEvent::SyncFinished { height }) => {
                info!("Initial sync finished at height {}", height)
            }
            Ok(SyncEvent::BlockCommitted { height, hash }) => {
                info!("Block #{} committed ({})", height, short_hex(&hash))
            }
            Ok(SyncEvent::BranchPromoted { first_height, len }) => {
                info!("Switched to fork at height {} ({} blocks)", first_height, len)
            }
            Err(RecvError::Lagged(skipped)) => warn!("Event logger lagged by {}", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = load_config();
    info!("Configuration: {}", serde_json::to_string(&config)?);

    let container = SyncContainer::new(config).context("Invalid block sync configuration")?;
    let mut runtime = NodeRuntime::new(container);
    runtime.start().await?;

    // Keep the node running
    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown();

    Ok(())
}
