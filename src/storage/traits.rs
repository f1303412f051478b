use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::node::{FileNode, FolderNode, Node, NodeId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Node not found: {0}")]
    NotFound(NodeId),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt row for '{id}': {reason}")]
    Corrupt {
        id: String,
        reason: String,
    },
}

/// Kind of change recorded in the store's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    /// Single-letter code stored in the `node_changes.op` column.
    #[must_use]
    pub fn as_code(&self) -> &'static str {
        match self {
            ChangeOp::Insert => "I",
            ChangeOp::Update => "U",
            ChangeOp::Delete => "D",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "I" => Some(ChangeOp::Insert),
            "U" => Some(ChangeOp::Update),
            "D" => Some(ChangeOp::Delete),
            _ => None,
        }
    }
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub version: i64,
    pub op: ChangeOp,
    pub node_id: NodeId,
}

/// How much of the change journal a housekeeping pass keeps.
///
/// An entry is pruned only when it is more than `keep_latest` versions
/// behind the newest entry *and* at or below `keep_after`, the version the
/// reader has already applied. The newest entry always survives, so the
/// journal's high-water mark never goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalRetention {
    /// Newest entries always kept (0 disables pruning)
    pub keep_latest: u64,
    /// Entries above this version are never pruned
    pub keep_after: i64,
}

impl JournalRetention {
    /// Retention that never prunes.
    #[must_use]
    pub fn keep_all() -> Self {
        Self {
            keep_latest: 0,
            keep_after: 0,
        }
    }

    /// Highest version that may be pruned given the journal's `newest`
    /// version, or `None` if nothing may go.
    #[must_use]
    pub fn prune_through(&self, newest: i64) -> Option<i64> {
        if self.keep_latest == 0 {
            return None;
        }
        let keep = i64::try_from(self.keep_latest).unwrap_or(i64::MAX);
        let cutoff = newest.saturating_sub(keep).min(self.keep_after);
        (cutoff > 0).then_some(cutoff)
    }
}

/// Rows reaped by one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingStats {
    /// Node rows whose parent no longer exists
    pub orphaned_nodes: u64,
    /// Folder/file payload rows without a node row
    pub orphaned_payloads: u64,
    /// Change journal entries past retention
    pub pruned_changes: u64,
}

impl HousekeepingStats {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.orphaned_nodes + self.orphaned_payloads + self.pruned_changes
    }
}

/// Durable backing store for the tree.
///
/// The engine mirrors this store in memory; every structural write goes
/// through here first. Implementations record each node insert, update and
/// delete in a change feed readable through [`fetch_changes_since`].
///
/// [`fetch_changes_since`]: NodeStore::fetch_changes_since
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Every node, folders and files.
    async fn load_all(&self) -> Result<Vec<Node>, StoreError>;

    async fn load_by_id(&self, id: NodeId) -> Result<Option<Node>, StoreError>;

    async fn insert_folder(&self, folder: &FolderNode) -> Result<(), StoreError>;

    async fn insert_file(&self, file: &FileNode) -> Result<(), StoreError>;

    /// Move `node_id` under `new_parent_id` unless a sibling there already
    /// has the same name. Returns the parent the node ends up with, which is
    /// the old parent when the move was refused.
    async fn change_parent(&self, node_id: NodeId, new_parent_id: NodeId) -> Result<NodeId, StoreError>;

    /// Delete a folder row plus every row whose parent is in
    /// `known_child_parent_ids`. Deeper descendants are left to housekeeping.
    async fn delete_folder_cascade(
        &self,
        node_id: NodeId,
        known_child_parent_ids: &HashSet<NodeId>,
    ) -> Result<(), StoreError>;

    async fn delete_file(&self, node_id: NodeId) -> Result<(), StoreError>;

    /// Highest change version currently recorded (0 when empty).
    async fn change_baseline_version(&self) -> Result<i64, StoreError>;

    /// Change entries with a version strictly greater than `version`.
    async fn fetch_changes_since(&self, version: i64) -> Result<Vec<ChangeEntry>, StoreError>;

    /// Reap node rows with a missing parent, then payload rows with no node
    /// row, then journal entries `retention` allows to go.
    async fn housekeeping_once(&self, retention: JournalRetention) -> Result<HousekeepingStats, StoreError>;
}
