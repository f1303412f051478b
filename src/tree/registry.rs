// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The in-memory mirror: every cell, keyed by node id.
//!
//! The registry owns all [`NodeCell`]s. Parent and child links are resolved
//! by id lookup (parent) or by a scan over the map (children), so no cell
//! ever holds a strong reference to another.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::node::{Node, NodeId};
use super::cell::{LazyTreeCell, TreeResolver};

/// A cell wrapping a [`Node`].
pub type NodeCell = LazyTreeCell<Node>;

/// Concurrent id → cell map.
#[derive(Default)]
pub struct NodeRegistry {
    cells: DashMap<NodeId, Arc<NodeCell>>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cell. The map guard is released before returning.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<Arc<NodeCell>> {
        self.cells.get(id).map(|entry| entry.value().clone())
    }

    /// Look up a cell that holds a folder.
    #[must_use]
    pub fn get_folder(&self, id: &NodeId) -> Option<Arc<NodeCell>> {
        self.get(id).filter(|cell| cell.data().is_folder())
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.cells.contains_key(id)
    }

    /// Insert a fresh cell for `node`, replacing any cell with the same id.
    pub fn insert(&self, node: Node) -> Arc<NodeCell> {
        let cell = Arc::new(LazyTreeCell::new(node));
        let id = cell.data().id();
        self.cells.insert(id, cell.clone());
        cell
    }

    /// Replace the data of an existing cell in place, or insert a new cell.
    ///
    /// Returns the cell and, when it already existed, its previous parent id.
    /// Memos are left alone; the caller clears what the change affected.
    pub fn upsert(&self, node: Node) -> (Arc<NodeCell>, Option<NodeId>) {
        match self.cells.entry(node.id()) {
            Entry::Occupied(entry) => {
                let cell = entry.get().clone();
                let previous_parent = cell.data().parent_id();
                cell.set_data(node);
                (cell, Some(previous_parent))
            }
            Entry::Vacant(entry) => {
                let cell = Arc::new(LazyTreeCell::new(node));
                entry.insert(cell.clone());
                (cell, None)
            }
        }
    }

    /// Put an existing cell back under its id.
    pub fn insert_cell(&self, cell: Arc<NodeCell>) {
        let id = cell.data().id();
        self.cells.insert(id, cell);
    }

    pub fn remove(&self, id: &NodeId) -> Option<Arc<NodeCell>> {
        self.cells.remove(id).map(|(_, cell)| cell)
    }

    /// Drop the children memo of `id`, if present.
    pub fn clear_children_of(&self, id: &NodeId) {
        if let Some(cell) = self.get(id) {
            debug!(node_id = %id, "Clearing children memo");
            cell.clear_children();
        }
    }

    /// Drop the parent memo of `id`, if present.
    pub fn clear_parent_of(&self, id: &NodeId) {
        if let Some(cell) = self.get(id) {
            debug!(node_id = %id, "Clearing parent memo");
            cell.clear_parent();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Id of the root folder, if loaded.
    #[must_use]
    pub fn root_id(&self) -> Option<NodeId> {
        self.cells
            .iter()
            .find(|entry| entry.value().data().is_root())
            .map(|entry| *entry.key())
    }

    pub fn clear(&self) {
        self.cells.clear();
    }
}

impl TreeResolver<Node> for NodeRegistry {
    fn resolve_parent(&self, cell: &NodeCell) -> Option<Arc<NodeCell>> {
        let data = cell.data();
        if data.is_root() || data.parent_id() == data.id() {
            return None;
        }
        self.get(&data.parent_id())
    }

    fn resolve_children(&self, cell: &NodeCell) -> Vec<Arc<NodeCell>> {
        let id = cell.data().id();
        // Collect under the shard guards, then release them.
        self.cells
            .iter()
            .filter(|entry| {
                let child = entry.value().data();
                child.id() != id && child.parent_id() == id
            })
            .map(|entry| entry.value().clone())
            .collect()
    }
}
