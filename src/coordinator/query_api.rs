//! Read operations. All answered from the registry; none touch the store.

use std::collections::HashSet;

use crate::node::{FileNode, FolderNode, Node, NodeId, PATH_SEPARATOR};
use crate::metrics::LatencyTimer;

use super::{EngineError, TreeSyncEngine};

impl TreeSyncEngine {
    /// Look up a node by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_node(&self, id: NodeId) -> Result<Option<Node>, EngineError> {
        self.ready().await?;
        crate::metrics::record_operation("get_node", "success");
        Ok(self.registry.get(&id).map(|cell| Node::clone(&cell.data())))
    }

    /// Direct children of a folder, folders first, then by full name.
    #[tracing::instrument(skip(self))]
    pub async fn list_children(&self, folder_id: NodeId) -> Result<Vec<Node>, EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("list_children");
        let result = self.children_of(folder_id);
        self.observe("list_children", result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_subfolders(&self, folder_id: NodeId) -> Result<Vec<FolderNode>, EngineError> {
        self.ready().await?;
        let result = self.children_of(folder_id).map(|children| {
            children
                .into_iter()
                .filter_map(|node| match node {
                    Node::Folder(folder) => Some(folder),
                    Node::File(_) => None,
                })
                .collect()
        });
        self.observe("list_subfolders", result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_files(&self, folder_id: NodeId) -> Result<Vec<FileNode>, EngineError> {
        self.ready().await?;
        let result = self.children_of(folder_id).map(|children| {
            children
                .into_iter()
                .filter_map(|node| match node {
                    Node::File(file) => Some(file),
                    Node::Folder(_) => None,
                })
                .collect()
        });
        self.observe("list_files", result)
    }

    /// Full names from the root down to `node_id`, joined with `\`. An
    /// unnamed root contributes nothing, so its children's paths start with
    /// their own name.
    ///
    /// A node whose ancestors are not all loaded yields the partial path
    /// from the highest loaded ancestor.
    #[tracing::instrument(skip(self))]
    pub async fn full_path(&self, node_id: NodeId) -> Result<String, EngineError> {
        self.ready().await?;
        let _timer = LatencyTimer::new("full_path");
        let result = self.path_of(node_id);
        self.observe("full_path", result)
    }

    /// Every file in the subtree under `folder_id` matching `predicate`, in
    /// preorder.
    #[tracing::instrument(skip(self, predicate))]
    pub async fn search_files<P>(&self, folder_id: NodeId, predicate: P) -> Result<Vec<FileNode>, EngineError>
    where
        P: Fn(&FileNode) -> bool,
    {
        self.ready().await?;
        let _timer = LatencyTimer::new("search_files");
        let result = self.folder_cell(folder_id).map(|folder| {
            folder
                .traverse_preorder(&*self.registry)
                .filter_map(|cell| cell.data().as_file().filter(|file| predicate(*file)).cloned())
                .collect()
        });
        self.observe("search_files", result)
    }

    fn children_of(&self, folder_id: NodeId) -> Result<Vec<Node>, EngineError> {
        let folder = self.folder_cell(folder_id)?;
        let mut children: Vec<Node> = folder
            .children(&*self.registry)
            .iter()
            .map(|cell| Node::clone(&cell.data()))
            .collect();
        children.sort_by(|a, b| {
            a.node_type()
                .as_i64()
                .cmp(&b.node_type().as_i64())
                .then_with(|| a.full_name().cmp(&b.full_name()))
        });
        Ok(children)
    }

    fn path_of(&self, node_id: NodeId) -> Result<String, EngineError> {
        let mut current = Some(self.registry.get(&node_id).ok_or(EngineError::NotFound(node_id))?);
        let mut names = Vec::new();
        let mut seen = HashSet::new();

        while let Some(cell) = current {
            let data = cell.data();
            // Guards against a parent cycle written by an external writer
            if !seen.insert(data.id()) {
                break;
            }
            let name = data.full_name();
            if !name.is_empty() {
                names.push(name);
            }
            current = cell.parent(&*self.registry);
        }

        names.reverse();
        let separator = PATH_SEPARATOR.to_string();
        Ok(names.join(separator.as_str()))
    }
}
