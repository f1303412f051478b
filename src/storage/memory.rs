use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::node::{FileNode, FolderNode, Node, NodeId};
use super::traits::{ChangeEntry, ChangeOp, HousekeepingStats, JournalRetention, NodeStore, StoreError};

#[derive(Default)]
struct MemoryState {
    nodes: HashMap<NodeId, Node>,
    changes: Vec<ChangeEntry>,
    version: i64,
}

impl MemoryState {
    fn record(&mut self, op: ChangeOp, node_id: NodeId) {
        self.version += 1;
        self.changes.push(ChangeEntry {
            version: self.version,
            op,
            node_id,
        });
    }

    fn remove(&mut self, id: &NodeId) -> bool {
        if self.nodes.remove(id).is_some() {
            self.record(ChangeOp::Delete, *id);
            true
        } else {
            false
        }
    }
}

/// Store held entirely in memory, with a change journal.
///
/// Each trait call runs under one lock, so a call is atomic the way a SQL
/// transaction would be. The `upsert_node` / `remove_node` / `set_parent`
/// helpers write behind the engine's back, the way another process sharing
/// the database would.
#[derive(Default)]
pub struct InMemoryNodeStore {
    state: Mutex<MemoryState>,
}

impl InMemoryNodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `nodes`. Seeding does not touch the journal.
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            for node in nodes {
                state.nodes.insert(node.id(), node);
            }
        }
        store
    }

    /// Insert or replace a node, journaled as insert or update.
    pub fn upsert_node(&self, node: Node) {
        let mut state = self.state.lock();
        let op = if state.nodes.contains_key(&node.id()) {
            ChangeOp::Update
        } else {
            ChangeOp::Insert
        };
        let id = node.id();
        state.nodes.insert(id, node);
        state.record(op, id);
    }

    /// Delete a node row only; children are left in place.
    pub fn remove_node(&self, id: NodeId) -> bool {
        self.state.lock().remove(&id)
    }

    /// Re-parent a node without any collision check.
    pub fn set_parent(&self, id: NodeId, parent_id: NodeId) -> bool {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get(&id).map(|n| n.with_parent(parent_id)) else {
            return false;
        };
        state.nodes.insert(id, node);
        state.record(ChangeOp::Update, id);
        true
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<Node> {
        self.state.lock().nodes.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.state.lock().nodes.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the rows whose parent is `parent_id`.
    #[must_use]
    pub fn children_of(&self, parent_id: &NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .values()
            .filter(|n| n.parent_id() == *parent_id && n.id() != *parent_id)
            .map(Node::id)
            .collect()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn load_all(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.state.lock().nodes.values().cloned().collect())
    }

    async fn load_by_id(&self, id: NodeId) -> Result<Option<Node>, StoreError> {
        Ok(self.get(&id))
    }

    async fn insert_folder(&self, folder: &FolderNode) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.nodes.contains_key(&folder.id) {
            return Err(StoreError::Backend(format!("duplicate node id {}", folder.id)));
        }
        state.nodes.insert(folder.id, Node::Folder(folder.clone()));
        state.record(ChangeOp::Insert, folder.id);
        Ok(())
    }

    async fn insert_file(&self, file: &FileNode) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.nodes.contains_key(&file.id) {
            return Err(StoreError::Backend(format!("duplicate node id {}", file.id)));
        }
        state.nodes.insert(file.id, Node::File(file.clone()));
        state.record(ChangeOp::Insert, file.id);
        Ok(())
    }

    async fn change_parent(&self, node_id: NodeId, new_parent_id: NodeId) -> Result<NodeId, StoreError> {
        let mut state = self.state.lock();
        let node = state.nodes.get(&node_id).cloned().ok_or(StoreError::NotFound(node_id))?;

        let collides = state.nodes.values().any(|n| {
            n.id() != node_id && n.parent_id() == new_parent_id && n.name() == node.name()
        });
        if collides {
            return Ok(node.parent_id());
        }

        state.nodes.insert(node_id, node.with_parent(new_parent_id));
        state.record(ChangeOp::Update, node_id);
        Ok(new_parent_id)
    }

    async fn delete_folder_cascade(
        &self,
        node_id: NodeId,
        known_child_parent_ids: &HashSet<NodeId>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.remove(&node_id);

        let doomed: Vec<NodeId> = state
            .nodes
            .values()
            .filter(|n| !n.is_root() && known_child_parent_ids.contains(&n.parent_id()))
            .map(Node::id)
            .collect();
        for id in doomed {
            state.remove(&id);
        }
        Ok(())
    }

    async fn delete_file(&self, node_id: NodeId) -> Result<(), StoreError> {
        self.state.lock().remove(&node_id);
        Ok(())
    }

    async fn change_baseline_version(&self) -> Result<i64, StoreError> {
        Ok(self.state.lock().version)
    }

    async fn fetch_changes_since(&self, version: i64) -> Result<Vec<ChangeEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .changes
            .iter()
            .filter(|c| c.version > version)
            .cloned()
            .collect())
    }

    async fn housekeeping_once(&self, retention: JournalRetention) -> Result<HousekeepingStats, StoreError> {
        let mut state = self.state.lock();
        let orphans: Vec<NodeId> = state
            .nodes
            .values()
            .filter(|n| {
                n.parent_id() != n.id() && !state.nodes.contains_key(&n.parent_id())
            })
            .map(Node::id)
            .collect();

        for id in &orphans {
            state.remove(id);
        }

        let before = state.changes.len();
        if let Some(cutoff) = retention.prune_through(state.version) {
            state.changes.retain(|c| c.version > cutoff);
        }

        Ok(HousekeepingStats {
            orphaned_nodes: orphans.len() as u64,
            orphaned_payloads: 0,
            pruned_changes: (before - state.changes.len()) as u64,
        })
    }
}
