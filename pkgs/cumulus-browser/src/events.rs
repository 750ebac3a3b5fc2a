//! Notifications surfaced to the UI layer

use cumulus_fs::{ApiError, Directory, Node, NodeId};

use crate::ids::TaskId;

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    // Navigation events
    DirectoryChanged {
        directory: Directory,
    },
    NavigationFailed {
        path: String,
        error: ApiError,
    },
    PageFailed {
        error: ApiError,
    },
    SearchFailed {
        error: ApiError,
    },

    // Transfer events
    UploadCompleted {
        task: TaskId,
        node: Node,
    },
    UploadFailed {
        task: TaskId,
        filename: String,
        error: ApiError,
    },
    UploadsDrained,
    NodesMoved {
        nodes: Vec<Node>,
        destination: String,
    },
    MoveFailed {
        destination: String,
        error: ApiError,
    },

    // Tree edit events
    DirectoryCreated {
        directory: Directory,
    },
    NodesDeleted {
        node_ids: Vec<NodeId>,
    },
    OperationFailed {
        error: ApiError,
    },
}

impl BrowserEvent {
    /// Error carried by a failure event
    pub fn error(&self) -> Option<&ApiError> {
        match self {
            BrowserEvent::NavigationFailed { error, .. }
            | BrowserEvent::PageFailed { error }
            | BrowserEvent::SearchFailed { error }
            | BrowserEvent::UploadFailed { error, .. }
            | BrowserEvent::MoveFailed { error, .. }
            | BrowserEvent::OperationFailed { error } => Some(error),
            _ => None,
        }
    }
}
