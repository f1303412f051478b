//! Housekeeping loop: reaps orphaned rows and old journal entries in the
//! store.
//!
//! Folder deletes only cascade one level below the folders the mirror knew
//! about, so deeper descendants linger until this loop removes them, one
//! level per pass. The registry is never touched here; the change feed
//! reports the deletions like any other.
//!
//! Journal pruning never crosses the engine's own watermark.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::storage::traits::{HousekeepingStats, JournalRetention, NodeStore};

use super::{EngineError, TreeSyncEngine};

impl TreeSyncEngine {
    /// Run one housekeeping pass now.
    #[tracing::instrument(skip(self))]
    pub async fn housekeeping_once(&self) -> Result<HousekeepingStats, EngineError> {
        self.ready().await?;
        let retention = retention(self.config.change_journal_retention, &self.watermark);
        let stats = self.store.housekeeping_once(retention).await?;
        record(&stats);
        Ok(stats)
    }
}

fn retention(keep_latest: u64, watermark: &AtomicI64) -> JournalRetention {
    JournalRetention {
        keep_latest,
        keep_after: watermark.load(Ordering::Acquire),
    }
}

fn record(stats: &HousekeepingStats) {
    crate::metrics::record_housekeeping(stats);
    if stats.total() > 0 {
        info!(
            orphaned_nodes = stats.orphaned_nodes,
            orphaned_payloads = stats.orphaned_payloads,
            pruned_changes = stats.pruned_changes,
            "Housekeeping reaped rows"
        );
    }
}

pub(super) async fn run_housekeeping(
    store: Arc<dyn NodeStore>,
    watermark: Arc<AtomicI64>,
    journal_retention: u64,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(?interval, "Housekeeping loop started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match store.housekeeping_once(retention(journal_retention, &watermark)).await {
            Ok(stats) => record(&stats),
            Err(e) => {
                warn!(error = %e, "Housekeeping failed, retrying next tick");
                crate::metrics::record_error("housekeeping", "reap", "store");
            }
        }
    }
    debug!("Housekeeping loop stopped");
}
