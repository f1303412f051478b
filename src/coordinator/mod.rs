// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree sync engine coordinator.
//!
//! The [`TreeSyncEngine`] ties together:
//! - the [`NodeRegistry`] mirror of the tree, read by every query
//! - a [`NodeStore`] that every structural write goes through first
//! - the change-poll loop folding external writes back into the mirror
//! - the housekeeping loop reaping orphaned rows in the store
//!
//! # Lifecycle
//!
//! ```text
//! Created → Loading → Ready → Running → ShuttingDown → Stopped
//!              └──→ Failed
//! ```
//!
//! Operations called before startup finishes wait for it; they fail with
//! [`EngineError::Unavailable`] if startup failed or the engine is stopping.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tree_sync::{EngineState, InMemoryNodeStore, TreeSyncConfig, TreeSyncEngine};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = TreeSyncEngine::new(
//!     TreeSyncConfig::new("memory"),
//!     Arc::new(InMemoryNodeStore::new()),
//! );
//! assert_eq!(engine.state(), EngineState::Created);
//!
//! engine.start().await.expect("start failed");
//! assert!(engine.is_ready());
//! engine.shutdown().await;
//! # }
//! ```

mod types;
mod reconcile;
mod query_api;
mod mutation_api;
mod lifecycle;
mod change_poll;
mod housekeeping;

pub use types::{EngineError, EngineState};

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::TreeSyncConfig;
use crate::node::NodeId;
use crate::storage::sql::SqlNodeStore;
use crate::storage::traits::NodeStore;
use crate::tree::{NodeCell, NodeRegistry};

use reconcile::Reconciler;

/// In-memory mirror of a folder/file tree kept in sync with a [`NodeStore`].
///
/// # Thread Safety
///
/// The engine is `Send + Sync`; every method takes `&self`. Share it behind
/// an `Arc`. Reads never touch the store.
pub struct TreeSyncEngine {
    pub(super) config: TreeSyncConfig,

    /// Durable store, ground truth
    pub(super) store: Arc<dyn NodeStore>,

    /// Mirror of the store; owns every cell
    pub(super) registry: Arc<NodeRegistry>,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,
    pub(super) state_rx: watch::Receiver<EngineState>,

    /// Highest change version folded into the registry
    pub(super) watermark: Arc<AtomicI64>,

    /// Flipped to `true` to stop the background loops
    pub(super) shutdown_tx: watch::Sender<bool>,

    /// Background loop handles, joined on shutdown
    pub(super) tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Serializes start() and shutdown()
    pub(super) lifecycle: tokio::sync::Mutex<()>,
}

impl TreeSyncEngine {
    /// Create an engine over an existing store.
    ///
    /// The engine starts in `Created` state. Call [`start()`](Self::start)
    /// to load the tree and begin polling.
    pub fn new(config: TreeSyncConfig, store: Arc<dyn NodeStore>) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            store,
            registry: Arc::new(NodeRegistry::new()),
            state: state_tx,
            state_rx,
            watermark: Arc::new(AtomicI64::new(0)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Validate `config` and connect a [`SqlNodeStore`] to `config.store_url`.
    pub async fn connect(config: TreeSyncConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        let store = SqlNodeStore::connect(&config.store_url).await?;
        info!("Tree sync engine connected to store");
        Ok(Self::new(config, Arc::new(store)))
    }

    #[must_use]
    pub fn config(&self) -> &TreeSyncConfig {
        &self.config
    }

    /// Get current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Check if engine is serving requests.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().accepts_operations()
    }

    /// Number of nodes in the mirror.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Highest change version applied to the mirror.
    #[must_use]
    pub fn change_version(&self) -> i64 {
        self.watermark.load(Ordering::Acquire)
    }

    /// Id of the root folder, once loaded.
    #[must_use]
    pub fn root_id(&self) -> Option<NodeId> {
        self.registry.root_id()
    }

    pub(super) fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
        crate::metrics::set_engine_state(&state.to_string(), state.as_gauge());
    }

    /// Readiness gate: wait until startup settles, then admit the call only
    /// if the engine is serving.
    pub(super) async fn ready(&self) -> Result<(), EngineError> {
        let mut rx = self.state_rx.clone();
        let state = match rx.wait_for(|s| s.is_settled()).await {
            Ok(state) => *state,
            Err(_) => EngineState::Stopped,
        };
        if state.accepts_operations() {
            Ok(())
        } else {
            Err(EngineError::Unavailable(state))
        }
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.registry.clone(), self.store.clone())
    }

    pub(super) fn folder_cell(&self, id: NodeId) -> Result<Arc<NodeCell>, EngineError> {
        self.registry.get_folder(&id).ok_or(EngineError::NotAFolder(id))
    }

    /// Count an operation outcome and pass the result through.
    pub(super) fn observe<T>(&self, operation: &str, result: Result<T, EngineError>) -> Result<T, EngineError> {
        match &result {
            Ok(_) => crate::metrics::record_operation(operation, "success"),
            Err(e) => {
                crate::metrics::record_operation(operation, "error");
                crate::metrics::record_error("engine", operation, e.kind());
            }
        }
        result
    }
}
