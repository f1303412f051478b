//! # Tree Sync
//!
//! An in-memory mirror of a folder/file tree kept in sync with a relational
//! store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TreeSyncEngine                          │
//! │  • Queries answered from the mirror, never the store       │
//! │  • Mutations write through, then invalidate memos          │
//! │  • Readiness gate until the tree is loaded                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  NodeRegistry (mirror)                      │
//! │  • DashMap<NodeId, Arc<LazyTreeCell<Node>>>                │
//! │  • Cells memoize parent/children as Weak links             │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!               (change-poll loop: reload / evict)
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                NodeStore (ground truth)                     │
//! │  • SQLite / MySQL via sqlx, or in-memory                   │
//! │  • Change journal fed by triggers                          │
//! │  • Housekeeping loop reaps orphaned rows                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tree_sync::{TreeSyncConfig, TreeSyncEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TreeSyncConfig::new("sqlite://tree.db?mode=rwc");
//!     let engine = TreeSyncEngine::connect(config).await.expect("Failed to connect");
//!     engine.start().await.expect("Failed to start");
//!
//!     let root = engine.root_id().expect("store has no root folder");
//!     let docs = engine.add_subfolder("Documents", root).await.unwrap();
//!     let note = engine.add_file("note.txt", b"hello".to_vec(), docs).await.unwrap();
//!
//!     println!("{}", engine.full_path(note).await.unwrap());
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`node`]: Folder and file data model
//! - [`tree`]: Lazy tree cells and the registry that owns them
//! - [`coordinator`]: The [`TreeSyncEngine`] and its background loops
//! - [`storage`]: The [`NodeStore`] seam with SQL and in-memory backends
//! - [`resilience`]: Retry with backoff for store calls
//! - [`metrics`]: `metrics` crate instrumentation

pub mod config;
pub mod node;
pub mod tree;
pub mod storage;
pub mod resilience;
pub mod coordinator;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::TreeSyncConfig;
pub use coordinator::{EngineError, EngineState, TreeSyncEngine};
pub use node::{FileNode, FolderNode, Node, NodeId, NodeType};
pub use tree::{LazyTreeCell, NodeCell, NodeRegistry, TreeResolver};
pub use storage::traits::{ChangeEntry, ChangeOp, HousekeepingStats, JournalRetention, NodeStore, StoreError};
pub use storage::memory::InMemoryNodeStore;
pub use storage::sql::SqlNodeStore;
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
