//! Engine lifecycle management: start and shutdown.
//!
//! Startup reads the change baseline first and bulk-loads second, so a write
//! racing with the load is replayed by the first poll instead of being lost.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{error, info, warn};

use super::change_poll::run_change_poll;
use super::housekeeping::run_housekeeping;
use super::{EngineError, EngineState, TreeSyncEngine};

impl TreeSyncEngine {
    /// Load the tree from the store and start the background loops.
    ///
    /// On failure the engine moves to `Failed` and every pending and future
    /// operation is rejected. Calling this twice returns
    /// [`EngineError::InvalidState`].
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), EngineError> {
        let _guard = self.lifecycle.lock().await;
        let current = self.state();
        if current != EngineState::Created {
            return Err(EngineError::InvalidState(current));
        }

        let startup_start = Instant::now();
        info!("Starting tree sync engine...");
        self.set_state(EngineState::Loading);

        if let Err(e) = self.load_tree().await {
            error!(error = %e, "Tree load failed, engine will not serve");
            crate::metrics::record_error("engine", "start", e.kind());
            self.set_state(EngineState::Failed);
            return Err(e);
        }
        self.set_state(EngineState::Ready);

        self.spawn_loops();
        self.set_state(EngineState::Running);
        crate::metrics::record_startup_total(startup_start.elapsed());
        info!(
            nodes = self.registry.len(),
            version = self.change_version(),
            "Tree sync engine running"
        );
        Ok(())
    }

    async fn load_tree(&self) -> Result<(), EngineError> {
        let phase_start = Instant::now();
        let baseline = self.store.change_baseline_version().await?;
        self.watermark.store(baseline, Ordering::Release);
        crate::metrics::set_change_watermark(baseline);
        crate::metrics::record_startup_phase("baseline", phase_start.elapsed());

        let phase_start = Instant::now();
        let nodes = self.store.load_all().await?;
        self.registry.clear();
        for node in nodes {
            self.registry.insert(node);
        }
        crate::metrics::set_registry_nodes(self.registry.len());
        crate::metrics::record_startup_phase("bulk_load", phase_start.elapsed());

        if self.registry.root_id().is_none() && !self.registry.is_empty() {
            warn!("Store has nodes but no root folder");
        }
        info!(nodes = self.registry.len(), baseline, "Tree loaded");
        Ok(())
    }

    fn spawn_loops(&self) {
        let mut tasks = self.tasks.lock();

        let interval = self.config.change_poll_interval();
        tasks.push(tokio::spawn(run_change_poll(
            self.reconciler(),
            self.watermark.clone(),
            interval,
            self.shutdown_tx.subscribe(),
        )));

        match self.config.housekeeping_interval() {
            Some(interval) => tasks.push(tokio::spawn(run_housekeeping(
                self.store.clone(),
                self.watermark.clone(),
                self.config.change_journal_retention,
                interval,
                self.shutdown_tx.subscribe(),
            ))),
            None => info!("Housekeeping disabled"),
        }
    }

    /// Stop the background loops and wait for them to finish.
    ///
    /// Operations issued afterwards fail with [`EngineError::Unavailable`].
    /// Calling this more than once is harmless.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        if matches!(self.state(), EngineState::Stopped | EngineState::Failed) {
            return;
        }

        let shutdown_start = Instant::now();
        info!("Shutting down tree sync engine...");
        self.set_state(EngineState::ShuttingDown);
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }

        self.set_state(EngineState::Stopped);
        crate::metrics::record_startup_phase("shutdown", shutdown_start.elapsed());
        info!("Tree sync engine stopped");
    }
}
