// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Namespace entries: folders and files.
//!
//! A [`Node`] is a closed union over [`FolderNode`] and [`FileNode`]. Callers
//! branch on [`Node::node_type()`] or match the variants directly.
//!
//! # Root sentinel
//!
//! The root folder references itself: its `parent_id` equals its `id` and
//! `is_root` is set. Ancestor walks stop at the root.
//!
//! # Example
//!
//! ```
//! use tree_sync::{FileNode, Node, NodeType};
//! use uuid::Uuid;
//!
//! let parent = Uuid::new_v4();
//! let file = Node::File(FileNode::new("note.txt", b"hello".to_vec(), parent));
//!
//! assert_eq!(file.name(), "note");
//! assert_eq!(file.full_name(), "note.txt");
//! assert_eq!(file.node_type(), NodeType::File);
//! assert_eq!(file.parent_id(), parent);
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a node. Unique across folders and files.
pub type NodeId = Uuid;

/// Separator used when joining ancestor names into a path.
pub const PATH_SEPARATOR: char = '\\';

/// Variant discriminator, stored as `node_type` in the SQL schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Folder = 0,
    File = 1,
}

impl NodeType {
    /// Column value used by the SQL store.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Parse the SQL column value.
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Folder),
            1 => Some(Self::File),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder => write!(f, "folder"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A folder. Carries no payload beyond its placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: NodeId,
    pub name: String,
    pub parent_id: NodeId,
    #[serde(default)]
    pub is_root: bool,
}

impl FolderNode {
    /// A new folder with a fresh id under `parent_id`.
    pub fn new(name: impl Into<String>, parent_id: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_id,
            is_root: false,
        }
    }

    /// The root folder: its parent is itself.
    pub fn root(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: id,
            is_root: true,
        }
    }
}

/// A file with its extension and opaque content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub id: NodeId,
    /// File name without extension.
    pub name: String,
    pub parent_id: NodeId,
    /// Extension including the leading dot, or empty.
    pub extension: String,
    pub content: Vec<u8>,
}

impl FileNode {
    /// A new file with a fresh id, splitting `file_name` into name and extension.
    pub fn new(file_name: &str, content: Vec<u8>, parent_id: NodeId) -> Self {
        let (name, extension) = split_file_name(file_name);
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            parent_id,
            extension: extension.to_string(),
            content,
        }
    }

    /// `name` followed by `extension`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }
}

/// An entry in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Folder(FolderNode),
    File(FileNode),
}

impl Node {
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::Folder(f) => f.id,
            Self::File(f) => f.id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(f) => &f.name,
            Self::File(f) => &f.name,
        }
    }

    #[must_use]
    pub fn parent_id(&self) -> NodeId {
        match self {
            Self::Folder(f) => f.parent_id,
            Self::File(f) => f.parent_id,
        }
    }

    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Folder(_) => NodeType::Folder,
            Self::File(_) => NodeType::File,
        }
    }

    /// True only for the root folder.
    #[must_use]
    pub fn is_root(&self) -> bool {
        match self {
            Self::Folder(f) => f.is_root,
            Self::File(_) => false,
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Display name: `name` for folders, `name + extension` for files.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self {
            Self::Folder(f) => f.name.clone(),
            Self::File(f) => f.full_name(),
        }
    }

    /// Copy of this node placed under `parent_id`.
    #[must_use]
    pub fn with_parent(&self, parent_id: NodeId) -> Self {
        let mut node = self.clone();
        match &mut node {
            Self::Folder(f) => f.parent_id = parent_id,
            Self::File(f) => f.parent_id = parent_id,
        }
        node
    }

    #[must_use]
    pub fn as_folder(&self) -> Option<&FolderNode> {
        match self {
            Self::Folder(f) => Some(f),
            Self::File(_) => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Self::File(f) => Some(f),
            Self::Folder(_) => None,
        }
    }
}

impl From<FolderNode> for Node {
    fn from(folder: FolderNode) -> Self {
        Self::Folder(folder)
    }
}

impl From<FileNode> for Node {
    fn from(file: FileNode) -> Self {
        Self::File(file)
    }
}

/// Split a file name at its last `.` into `(name, extension)`.
///
/// The extension keeps its leading dot. A trailing dot yields an empty
/// extension; a leading-dot name such as `.bash_history` is all extension.
///
/// ```
/// use tree_sync::node::split_file_name;
///
/// assert_eq!(split_file_name("note.txt"), ("note", ".txt"));
/// assert_eq!(split_file_name("some_note.3.txt"), ("some_note.3", ".txt"));
/// assert_eq!(split_file_name("README"), ("README", ""));
/// assert_eq!(split_file_name(".bash_history"), ("", ".bash_history"));
/// assert_eq!(split_file_name("a."), ("a", ""));
/// ```
#[must_use]
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 == file_name.len() => (&file_name[..idx], ""),
        Some(idx) => (&file_name[..idx], &file_name[idx..]),
        None => (file_name, ""),
    }
}

/// True if `name` may be used as a folder or file name: non-empty and free
/// of path separators.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(PATH_SEPARATOR) && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_references_itself() {
        let id = Uuid::new_v4();
        let root = Node::Folder(FolderNode::root(id, "C:"));
        assert!(root.is_root());
        assert_eq!(root.parent_id(), root.id());
    }

    #[test]
    fn test_full_name() {
        let parent = Uuid::new_v4();
        let folder = Node::Folder(FolderNode::new("Users", parent));
        let file = Node::File(FileNode::new("record20220315.docx", vec![], parent));

        assert_eq!(folder.full_name(), "Users");
        assert_eq!(file.name(), "record20220315");
        assert_eq!(file.full_name(), "record20220315.docx");
    }

    #[test]
    fn test_file_is_never_root() {
        let file = Node::File(FileNode::new("a.txt", vec![], Uuid::new_v4()));
        assert!(!file.is_root());
        assert!(file.is_file());
        assert!(!file.is_folder());
    }

    #[test]
    fn test_with_parent_keeps_identity() {
        let old_parent = Uuid::new_v4();
        let new_parent = Uuid::new_v4();
        let node = Node::File(FileNode::new("a.txt", b"x".to_vec(), old_parent));

        let moved = node.with_parent(new_parent);
        assert_eq!(moved.id(), node.id());
        assert_eq!(moved.parent_id(), new_parent);
        assert_eq!(moved.as_file().unwrap().content, b"x");
    }

    #[test]
    fn test_split_file_name_edge_cases() {
        assert_eq!(split_file_name("note"), ("note", ""));
        assert_eq!(split_file_name(".bash_profile"), ("", ".bash_profile"));
        assert_eq!(split_file_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_file_name(""), ("", ""));
    }

    #[test]
    fn test_node_type_round_trip_column() {
        assert_eq!(NodeType::from_i64(NodeType::Folder.as_i64()), Some(NodeType::Folder));
        assert_eq!(NodeType::from_i64(NodeType::File.as_i64()), Some(NodeType::File));
        assert_eq!(NodeType::from_i64(7), None);
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("Documents"));
        assert!(is_valid_name(".bash_history"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a\\b"));
        assert!(!is_valid_name("a/b"));
    }

    #[test]
    fn test_serde_tagged() {
        let node = Node::Folder(FolderNode::new("Users", Uuid::new_v4()));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "folder");
        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
