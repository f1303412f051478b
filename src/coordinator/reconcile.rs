// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Folding store state back into the registry.
//!
//! Used by the write path (reload after insert) and by the change-poll loop.
//! Every method is idempotent, so replaying a change entry is harmless.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::node::{Node, NodeId};
use crate::storage::traits::{ChangeEntry, ChangeOp, NodeStore, StoreError};
use crate::tree::{NodeCell, NodeRegistry, TreeResolver};

#[derive(Clone)]
pub(super) struct Reconciler {
    pub(super) registry: Arc<NodeRegistry>,
    pub(super) store: Arc<dyn NodeStore>,
}

impl Reconciler {
    pub(super) fn new(registry: Arc<NodeRegistry>, store: Arc<dyn NodeStore>) -> Self {
        Self { registry, store }
    }

    /// Re-read one node from the store and merge it, or evict it if the store
    /// no longer has it.
    pub(super) async fn reload_node(&self, id: NodeId) -> Result<Option<Arc<NodeCell>>, StoreError> {
        match self.store.load_by_id(id).await? {
            Some(node) => Ok(Some(self.merge_node(node))),
            None => {
                self.evict_node(id);
                Ok(None)
            }
        }
    }

    /// Insert a new cell or update an existing one in place.
    pub(super) fn merge_node(&self, node: Node) -> Arc<NodeCell> {
        let id = node.id();
        let parent_id = node.parent_id();
        let (cell, previous_parent) = self.registry.upsert(node);

        match previous_parent {
            Some(old_parent) => {
                debug!(node_id = %id, %old_parent, new_parent = %parent_id, "Merged updated node");
                self.registry.clear_children_of(&old_parent);
                cell.clear_parent();
                cell.clear_children();
            }
            None => debug!(node_id = %id, parent = %parent_id, "Merged new node"),
        }
        if parent_id != id {
            self.registry.clear_children_of(&parent_id);
        }
        cell
    }

    /// Drop a cell. Its former parent forgets it and its children forget it
    /// as their parent.
    pub(super) fn evict_node(&self, id: NodeId) -> Option<Arc<NodeCell>> {
        let cell = self.registry.remove(&id)?;
        let data = cell.data();
        debug!(node_id = %id, "Evicted node");

        if data.parent_id() != id {
            self.registry.clear_children_of(&data.parent_id());
        }
        if data.is_folder() {
            for child in self.registry.resolve_children(&cell) {
                child.clear_parent();
            }
        }
        cell.clear_parent();
        cell.clear_children();
        Some(cell)
    }

    /// Apply a batch of change entries in order.
    ///
    /// A row the store cannot decode evicts the node and the batch goes on;
    /// any other store error stops the batch.
    pub(super) async fn apply_changes(&self, changes: &[ChangeEntry]) -> Result<(), StoreError> {
        for change in changes {
            match change.op {
                ChangeOp::Insert | ChangeOp::Update => match self.reload_node(change.node_id).await {
                    Ok(_) => {}
                    Err(StoreError::Corrupt { id, reason }) => {
                        warn!(
                            node_id = %change.node_id,
                            version = change.version,
                            row = %id,
                            %reason,
                            "Unreadable node row, evicting"
                        );
                        crate::metrics::record_error("change_poll", "reload", "corrupt");
                        self.evict_node(change.node_id);
                    }
                    Err(e) => return Err(e),
                },
                ChangeOp::Delete => {
                    self.evict_node(change.node_id);
                }
            }
            crate::metrics::record_change_applied(change.op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FileNode, FolderNode};
    use crate::storage::memory::InMemoryNodeStore;
    use uuid::Uuid;

    struct Fixture {
        reconciler: Reconciler,
        store: Arc<InMemoryNodeStore>,
        root: NodeId,
        docs: NodeId,
        pics: NodeId,
    }

    fn fixture() -> Fixture {
        let root = FolderNode::root(Uuid::new_v4(), "C:");
        let docs = FolderNode::new("Documents", root.id);
        let pics = FolderNode::new("Pictures", root.id);
        let nodes: Vec<Node> = vec![root.clone().into(), docs.clone().into(), pics.clone().into()];

        let store = Arc::new(InMemoryNodeStore::with_nodes(nodes.clone()));
        let registry = Arc::new(NodeRegistry::new());
        for node in nodes {
            registry.insert(node);
        }
        Fixture {
            reconciler: Reconciler::new(registry, store.clone()),
            store,
            root: root.id,
            docs: docs.id,
            pics: pics.id,
        }
    }

    #[test]
    fn test_merge_update_clears_both_parents() {
        let f = fixture();
        let registry: &NodeRegistry = &f.reconciler.registry;
        let file = FileNode::new("a.txt", vec![], f.docs);
        registry.insert(file.clone().into());

        let docs = registry.get(&f.docs).unwrap();
        let pics = registry.get(&f.pics).unwrap();
        let file_cell = registry.get(&file.id).unwrap();
        assert_eq!(docs.children(registry).len(), 1);
        assert!(pics.children(registry).is_empty());
        file_cell.parent(registry);

        f.reconciler.merge_node(Node::File(file.clone()).with_parent(f.pics));

        assert!(!docs.has_cached_children());
        assert!(!pics.has_cached_children());
        assert!(!file_cell.has_cached_parent());
        assert_eq!(pics.children(registry).len(), 1);
        assert_eq!(file_cell.parent(registry).unwrap().data().id(), f.pics);
    }

    #[test]
    fn test_merge_insert_clears_parent_children() {
        let f = fixture();
        let registry: &NodeRegistry = &f.reconciler.registry;
        let root = registry.get(&f.root).unwrap();
        assert_eq!(root.children(registry).len(), 2);

        f.reconciler.merge_node(FolderNode::new("Music", f.root).into());
        assert!(!root.has_cached_children());
        assert_eq!(root.children(registry).len(), 3);
    }

    #[test]
    fn test_evict_folder_detaches_children() {
        let f = fixture();
        let registry: &NodeRegistry = &f.reconciler.registry;
        let file = FileNode::new("a.txt", vec![], f.docs);
        registry.insert(file.clone().into());
        let file_cell = registry.get(&file.id).unwrap();
        let held_parent = file_cell.parent(registry).unwrap();

        f.reconciler.evict_node(f.docs).unwrap();
        assert!(!registry.contains(&f.docs));
        assert!(!file_cell.has_cached_parent());
        // The evicted cell is still alive here, but no longer resolvable
        assert!(file_cell.parent(registry).is_none());
        drop(held_parent);

        assert!(f.reconciler.evict_node(f.docs).is_none());
    }

    #[tokio::test]
    async fn test_reload_missing_node_evicts() {
        let f = fixture();
        f.store.remove_node(f.pics);
        let reloaded = f.reconciler.reload_node(f.pics).await.unwrap();
        assert!(reloaded.is_none());
        assert!(!f.reconciler.registry.contains(&f.pics));
    }

    #[tokio::test]
    async fn test_apply_changes_is_idempotent() {
        let f = fixture();
        let music = FolderNode::new("Music", f.root);
        f.store.upsert_node(music.clone().into());
        f.store.remove_node(f.pics);
        let changes = f.store.fetch_changes_since(0).await.unwrap();

        f.reconciler.apply_changes(&changes).await.unwrap();
        f.reconciler.apply_changes(&changes).await.unwrap();

        let registry: &NodeRegistry = &f.reconciler.registry;
        assert!(registry.contains(&music.id));
        assert!(!registry.contains(&f.pics));
        assert_eq!(registry.len(), 3);
    }
}
