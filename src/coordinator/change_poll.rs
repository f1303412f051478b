//! Change-poll loop: folds the store's change feed into the registry.
//!
//! The watermark only moves forward, and only after a whole batch applied
//! cleanly. A failed iteration leaves it where it was, so the next tick
//! refetches the same entries; applying an entry twice is harmless.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::storage::traits::StoreError;

use super::reconcile::Reconciler;
use super::{EngineError, TreeSyncEngine};

impl TreeSyncEngine {
    /// Run one poll iteration now. Returns how many change entries were
    /// applied.
    #[tracing::instrument(skip(self))]
    pub async fn poll_changes_once(&self) -> Result<usize, EngineError> {
        self.ready().await?;
        Ok(poll_once(&self.reconciler(), &self.watermark).await?)
    }
}

pub(super) async fn poll_once(reconciler: &Reconciler, watermark: &AtomicI64) -> Result<usize, StoreError> {
    let since = watermark.load(Ordering::Acquire);
    let changes = reconciler.store.fetch_changes_since(since).await?;
    crate::metrics::record_poll_batch(changes.len());
    if changes.is_empty() {
        return Ok(0);
    }

    reconciler.apply_changes(&changes).await?;

    let highest = changes.iter().map(|c| c.version).max().unwrap_or(since);
    let previous = watermark.fetch_max(highest, Ordering::AcqRel);
    crate::metrics::set_change_watermark(previous.max(highest));
    crate::metrics::set_registry_nodes(reconciler.registry.len());
    debug!(applied = changes.len(), from = since, to = highest, "Applied store changes");
    Ok(changes.len())
}

pub(super) async fn run_change_poll(
    reconciler: Reconciler,
    watermark: Arc<AtomicI64>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(?interval, "Change poll loop started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *shutdown.borrow() {
            break;
        }

        if let Err(e) = poll_once(&reconciler, &watermark).await {
            warn!(error = %e, watermark = watermark.load(Ordering::Acquire), "Change poll failed, retrying next tick");
            crate::metrics::record_error("change_poll", "poll", "store");
        }
    }
    debug!("Change poll loop stopped");
}
