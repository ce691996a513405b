//! Receiver assembly and daemon lifecycle.
//!
//! The [`Orchestrator`] wires the ingestion components together once at
//! process start and hands out shared references to them:
//!
//! ```text
//! ReceiverManager -> IngestionPipeline -> MemoryRecordStore
//!                                      -> BroadcastHub -> record logger task
//! ```
//!
//! # Lifecycle
//!
//! 1. Validate config, install the metrics recorder if enabled
//! 2. Build store, broadcast hub, pipeline, and receiver manager
//! 3. Autostart the configured receiver mode (if any)
//! 4. Wait for SIGTERM/SIGINT
//! 5. Stop background tasks, then stop the active receiver

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::broadcast;

use asterix_core::config::AsterixConfig;
use asterix_core::metrics as m;
use asterix_core::types::{IngestedRecord, ReceiverMode};
use asterix_receiver::{
    BroadcastHub, IngestionPipeline, MemoryRecordStore, ReceiverConfig, ReceiverManager,
    SourceOptions, StopOutcome,
};

use crate::metrics_server;

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL_SECS: u64 = 15;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: AsterixConfig,
    /// Single-slot receiver manager shared with any API surface.
    manager: Arc<ReceiverManager>,
    /// In-memory record store.
    store: Arc<MemoryRecordStore>,
    /// Real-time record broadcast.
    hub: BroadcastHub,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// Environment overrides are applied before validation.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = AsterixConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: AsterixConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let store = Arc::new(MemoryRecordStore::with_max_records(
            config.storage.max_records,
        ));
        let hub = BroadcastHub::new(config.broadcast.channel_capacity);
        let pipeline = IngestionPipeline::new(store.clone(), Arc::new(hub.clone()));
        let manager = Arc::new(ReceiverManager::new(
            pipeline,
            SourceOptions::from_core(&config.receiver),
        ));
        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::debug!(
            max_records = config.storage.max_records,
            channel_capacity = config.broadcast.channel_capacity,
            "ingestion components assembled"
        );

        Ok(Self {
            config,
            manager,
            store,
            hub,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the receiver named by `[receiver].autostart`.
    ///
    /// Returns the started mode, or `None` when autostart is `"none"`.
    pub async fn autostart(&self) -> Result<Option<ReceiverMode>> {
        let Some(mode) = autostart_mode(&self.config.receiver.autostart)? else {
            tracing::info!("receiver autostart disabled, waiting for start requests");
            return Ok(None);
        };

        let receiver_config = ReceiverConfig::from_core(&self.config.receiver, mode);
        self.manager
            .start(receiver_config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to autostart {} receiver: {}", mode, e))?;
        Ok(Some(mode))
    }

    /// Autostart, then run until a shutdown signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        self.autostart().await?;

        let logger_task = spawn_record_logger(self.hub.subscribe(), self.shutdown_tx.subscribe());
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("asterix-daemon running");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        let _ = self.shutdown_tx.send(());
        let _ = logger_task.await;
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop the active receiver, if any.
    pub async fn shutdown(&self) {
        match self.manager.stop().await {
            StopOutcome::Stopped => tracing::info!("active receiver stopped"),
            StopOutcome::NotRunning => tracing::debug!("no receiver was running at shutdown"),
        }
        tracing::info!(
            records = asterix_core::pipeline::RecordStore::count(self.store.as_ref()),
            uptime_secs = self.start_time.elapsed().as_secs(),
            "asterix-daemon shut down"
        );
    }

    /// Receiver manager handle for start/stop/status requests.
    pub fn manager(&self) -> &Arc<ReceiverManager> {
        &self.manager
    }

    /// Record store handle.
    pub fn store(&self) -> &Arc<MemoryRecordStore> {
        &self.store
    }

    /// Broadcast hub handle.
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AsterixConfig {
        &self.config
    }
}

/// Parse `[receiver].autostart` into an optional receiver mode.
pub fn autostart_mode(value: &str) -> Result<Option<ReceiverMode>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" => Ok(None),
        other => other
            .parse::<ReceiverMode>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid autostart mode: {}", e)),
    }
}

/// Log every broadcast record at debug level until shutdown.
fn spawn_record_logger(
    mut records: broadcast::Receiver<Arc<IngestedRecord>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = records.recv() => match received {
                    Ok(record) => tracing::debug!(
                        id = %record.id,
                        metadata = %record.metadata,
                        "record broadcast"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "record logger lagged behind broadcast");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("record logger stopped");
    })
}

/// Periodically publish the uptime gauge until shutdown.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(UPTIME_UPDATE_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl_c")
}
