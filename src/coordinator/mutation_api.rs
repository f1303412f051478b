// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Structural writes: create, move, delete.
//!
//! Each write validates against the registry, then goes to the store, then
//! updates the registry and clears exactly the memos the change affected:
//! the children memo of every folder whose membership changed and the parent
//! memo of every node that moved or left.
//!
//! Name checks run against the mirror and are best-effort; the store has the
//! final word on a concurrent collision.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::metrics::LatencyTimer;
use crate::node::{is_valid_name, split_file_name, FileNode, FolderNode, Node, NodeId};
use crate::tree::NodeCell;

use super::{EngineError, TreeSyncEngine};

impl TreeSyncEngine {
    /// Create a folder named `name` under `parent_id`.
    #[tracing::instrument(skip(self))]
    pub async fn add_subfolder(&self, name: &str, parent_id: NodeId) -> Result<NodeId, EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("add_subfolder");
        let result = self.add_subfolder_inner(name, parent_id).await;
        self.observe("add_subfolder", result)
    }

    /// Create a file under `parent_id`. `file_name` carries the extension
    /// ("note.txt"); collisions are checked on the name without it.
    #[tracing::instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn add_file(&self, file_name: &str, content: Vec<u8>, parent_id: NodeId) -> Result<NodeId, EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("add_file");
        let result = self.add_file_inner(file_name, content, parent_id).await;
        self.observe("add_file", result)
    }

    /// Move a node under `target_folder_id`.
    ///
    /// If the store refuses the move (a sibling with the same name appeared
    /// there in the meantime) this returns `Ok(())` and nothing changes.
    #[tracing::instrument(skip(self))]
    pub async fn move_node(&self, node_id: NodeId, target_folder_id: NodeId) -> Result<(), EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("move_node");
        let result = self.move_node_inner(node_id, target_folder_id).await;
        self.observe("move_node", result)
    }

    /// Delete a folder and everything under it. Does nothing if `folder_id`
    /// is not a loaded folder.
    #[tracing::instrument(skip(self))]
    pub async fn delete_folder(&self, folder_id: NodeId) -> Result<(), EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("delete_folder");
        let Some(cell) = self.registry.get_folder(&folder_id) else {
            debug!(%folder_id, "Delete of unknown folder ignored");
            crate::metrics::record_operation("delete_folder", "noop");
            return Ok(());
        };
        let result = self.delete_folder_inner(folder_id, cell).await;
        self.observe("delete_folder", result)
    }

    /// Delete a file. Does nothing if `file_id` is not loaded; fails with
    /// [`EngineError::NotAFile`] on a folder.
    #[tracing::instrument(skip(self))]
    pub async fn delete_file(&self, file_id: NodeId) -> Result<(), EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("delete_file");
        let Some(cell) = self.registry.get(&file_id) else {
            debug!(%file_id, "Delete of unknown file ignored");
            crate::metrics::record_operation("delete_file", "noop");
            return Ok(());
        };
        let result = self.delete_file_inner(file_id, cell).await;
        self.observe("delete_file", result)
    }

    async fn add_subfolder_inner(&self, name: &str, parent_id: NodeId) -> Result<NodeId, EngineError> {
        if !is_valid_name(name) {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        let parent = self.folder_cell(parent_id)?;
        self.ensure_name_free(&parent, parent_id, name, None)?;

        let folder = FolderNode::new(name, parent_id);
        self.store.insert_folder(&folder).await?;
        let id = folder.id;
        self.adopt_inserted(Node::Folder(folder)).await;
        Ok(id)
    }

    async fn add_file_inner(&self, file_name: &str, content: Vec<u8>, parent_id: NodeId) -> Result<NodeId, EngineError> {
        if !is_valid_name(file_name) {
            return Err(EngineError::InvalidName(file_name.to_string()));
        }
        let parent = self.folder_cell(parent_id)?;
        let (stem, _) = split_file_name(file_name);
        self.ensure_name_free(&parent, parent_id, stem, None)?;

        let file = FileNode::new(file_name, content, parent_id);
        self.store.insert_file(&file).await?;
        let id = file.id;
        self.adopt_inserted(Node::File(file)).await;
        Ok(id)
    }

    async fn move_node_inner(&self, node_id: NodeId, target_id: NodeId) -> Result<(), EngineError> {
        let cell = self.registry.get(&node_id).ok_or(EngineError::NotFound(node_id))?;
        let target = self.registry.get(&target_id).ok_or(EngineError::NotFound(target_id))?;
        if !target.data().is_folder() {
            return Err(EngineError::NotAFolder(target_id));
        }

        let data = cell.data();
        if data.is_root() {
            return Err(EngineError::RootNode(node_id));
        }
        let old_parent = data.parent_id();
        if old_parent == target_id {
            return Err(EngineError::AlreadyInFolder { node_id, folder_id: target_id });
        }
        if data.is_folder() && self.is_within(&target, node_id) {
            return Err(EngineError::MoveIntoDescendant { node_id, target_id });
        }
        self.ensure_name_free(&target, target_id, data.name(), Some(node_id))?;

        let resulting_parent = self.store.change_parent(node_id, target_id).await?;
        if resulting_parent == old_parent {
            debug!(%node_id, %target_id, "Store refused move, name taken at target");
            return Ok(());
        }

        cell.set_data(data.with_parent(resulting_parent));
        cell.clear_parent();
        self.registry.clear_children_of(&old_parent);
        self.registry.clear_children_of(&resulting_parent);
        Ok(())
    }

    async fn delete_folder_inner(&self, folder_id: NodeId, cell: Arc<NodeCell>) -> Result<(), EngineError> {
        let data = cell.data();
        if data.is_root() {
            return Err(EngineError::RootNode(folder_id));
        }
        let parent_id = data.parent_id();

        let subtree: Vec<Arc<NodeCell>> = cell.traverse_preorder(&*self.registry).collect();
        let mut parent_ids: HashSet<NodeId> = subtree.iter().map(|c| c.data().parent_id()).collect();
        parent_ids.insert(folder_id);
        parent_ids.remove(&parent_id);

        for member in &subtree {
            self.registry.remove(&member.data().id());
            member.clear_parent();
        }
        self.registry.clear_children_of(&parent_id);
        debug!(%folder_id, removed = subtree.len(), "Removed subtree from registry");

        if let Err(e) = self.store.delete_folder_cascade(folder_id, &parent_ids).await {
            warn!(%folder_id, error = %e, "Store delete failed, restoring subtree");
            for member in subtree {
                self.registry.insert_cell(member);
            }
            self.registry.clear_children_of(&parent_id);
            return Err(e.into());
        }

        crate::metrics::set_registry_nodes(self.registry.len());
        Ok(())
    }

    async fn delete_file_inner(&self, file_id: NodeId, cell: Arc<NodeCell>) -> Result<(), EngineError> {
        let data = cell.data();
        if !data.is_file() {
            return Err(EngineError::NotAFile(file_id));
        }
        let parent_id = data.parent_id();

        self.registry.remove(&file_id);
        cell.clear_parent();
        self.registry.clear_children_of(&parent_id);

        if let Err(e) = self.store.delete_file(file_id).await {
            warn!(%file_id, error = %e, "Store delete failed, restoring file");
            self.registry.insert_cell(cell);
            self.registry.clear_children_of(&parent_id);
            return Err(e.into());
        }

        crate::metrics::set_registry_nodes(self.registry.len());
        Ok(())
    }

    /// Fail with `NameCollision` if a child of `folder` other than `except`
    /// already has `name`.
    fn ensure_name_free(
        &self,
        folder: &NodeCell,
        folder_id: NodeId,
        name: &str,
        except: Option<NodeId>,
    ) -> Result<(), EngineError> {
        let taken = folder
            .children(&*self.registry)
            .iter()
            .any(|child| {
                let child = child.data();
                Some(child.id()) != except && child.name() == name
            });
        if taken {
            return Err(EngineError::NameCollision {
                parent_id: folder_id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// True if `ancestor_id` is `cell` itself or one of its ancestors.
    fn is_within(&self, cell: &Arc<NodeCell>, ancestor_id: NodeId) -> bool {
        let mut current = Some(cell.clone());
        let mut seen = HashSet::new();
        while let Some(c) = current {
            let id = c.data().id();
            if id == ancestor_id {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            current = c.parent(&*self.registry);
        }
        false
    }

    /// Put a freshly written node into the registry, preferring the store's
    /// copy of it.
    async fn adopt_inserted(&self, local: Node) {
        let id = local.id();
        match self.reconciler().reload_node(id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(node_id = %id, "Inserted node not found on reload, using local copy");
                self.reconciler().merge_node(local);
            }
            Err(e) => {
                warn!(node_id = %id, error = %e, "Reload after insert failed, using local copy");
                self.reconciler().merge_node(local);
            }
        }
        crate::metrics::set_registry_nodes(self.registry.len());
    }
}
