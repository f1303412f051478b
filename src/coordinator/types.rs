//! Public types for the tree sync engine coordinator.

use thiserror::Error;

use crate::node::NodeId;
use crate::storage::traits::StoreError;

/// Engine lifecycle state.
///
/// ```text
/// Created → Loading → Ready → Running → ShuttingDown → Stopped
///              └──→ Failed
/// ```
///
/// Use [`super::TreeSyncEngine::state()`] to check the current state or
/// [`super::TreeSyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Reading the change baseline and bulk-loading the tree
    Loading,
    /// Tree loaded, background loops not yet spawned
    Ready,
    /// Serving, with change polling and housekeeping running
    Running,
    /// Stopping background loops
    ShuttingDown,
    /// Background loops joined
    Stopped,
    /// Startup failed; the engine will not serve
    Failed,
}

impl EngineState {
    /// Anything but `Created`/`Loading`: operations stop waiting.
    #[must_use]
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Created | Self::Loading)
    }

    #[must_use]
    pub fn accepts_operations(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// Numeric value for the state gauge.
    #[must_use]
    pub fn as_gauge(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Loading => 1,
            Self::Ready => 2,
            Self::Running => 3,
            Self::ShuttingDown => 4,
            Self::Stopped => 5,
            Self::Failed => 6,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Node not found: {0}")]
    NotFound(NodeId),
    #[error("Node {0} is not a folder")]
    NotAFolder(NodeId),
    #[error("Node {0} is not a file")]
    NotAFile(NodeId),
    #[error("Folder {parent_id} already contains '{name}'")]
    NameCollision { parent_id: NodeId, name: String },
    #[error("Node {node_id} is already in folder {folder_id}")]
    AlreadyInFolder { node_id: NodeId, folder_id: NodeId },
    #[error("Operation not allowed on the root folder {0}")]
    RootNode(NodeId),
    #[error("Cannot move {node_id} into its own subtree at {target_id}")]
    MoveIntoDescendant { node_id: NodeId, target_id: NodeId },
    #[error("Invalid name '{0}'")]
    InvalidName(String),
    #[error("Engine unavailable ({0})")]
    Unavailable(EngineState),
    #[error("Not allowed while engine is {0}")]
    InvalidState(EngineState),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// A node exists but is the wrong variant for the call.
    #[must_use]
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::NotAFolder(_) | Self::NotAFile(_))
    }

    /// Short label for the `error_type` metric.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotAFolder(_) | Self::NotAFile(_) => "type_mismatch",
            Self::NameCollision { .. } => "name_collision",
            Self::AlreadyInFolder { .. } => "already_in_folder",
            Self::RootNode(_) => "root_node",
            Self::MoveIntoDescendant { .. } => "move_into_descendant",
            Self::InvalidName(_) => "invalid_name",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidState(_) => "invalid_state",
            Self::Config(_) => "config",
            Self::Store(_) => "store",
        }
    }
}
