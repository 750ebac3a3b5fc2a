//! Drag gesture tracking and drop resolution

use cumulus_fs::{path, ApiError, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::ids::RequestId;
use crate::selection::{selected_nodes, Selection};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

/// Nodes being dragged, plus the pointer for the ghost preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraggedSelection {
    pub nodes: Vec<Node>,
    pub pointer: Pointer,
}

impl DraggedSelection {
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id().to_string()).collect()
    }
}

/// A batched move sent to the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    pub node_ids: Vec<NodeId>,
    /// Directory the nodes were dragged out of
    pub source_directory_id: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default)]
pub struct DragMove {
    dragged: Option<DraggedSelection>,
    pending: HashMap<RequestId, PendingMove>,
    last_error: Option<ApiError>,
}

impl DragMove {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dragged(&self) -> Option<&DraggedSelection> {
        self.dragged.as_ref()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Dragging a selected node drags the whole selection, anything else
    /// drags only that node.
    pub fn begin(&mut self, node: Node, selection: &Selection, content: &[Node], pointer: Pointer) {
        let mut nodes = if selection.is_selected(node.id()) {
            selected_nodes(content, selection)
        } else {
            Vec::new()
        };
        if nodes.is_empty() {
            nodes.push(node);
        }

        debug!("Dragging {} node(s)", nodes.len());
        self.dragged = Some(DraggedSelection { nodes, pointer });
    }

    pub fn move_pointer(&mut self, pointer: Pointer) {
        if let Some(dragged) = self.dragged.as_mut() {
            dragged.pointer = pointer;
        }
    }

    /// Resolve a drop onto `target`.
    ///
    /// Returns the move to issue, or `None` when the drop is rejected: no
    /// drag in progress, the target is a file, or the target is one of the
    /// dragged nodes or lies inside one of them.
    pub fn drop_on(
        &mut self,
        target: &Node,
        source_directory_id: &str,
        request: RequestId,
    ) -> Option<PendingMove> {
        let dragged = self.dragged.as_ref()?;

        if !target.is_directory() {
            warn!("Rejected drop onto file {}", target.path());
            return None;
        }
        let into_itself = dragged.nodes.iter().any(|node| {
            node.id() == target.id() || path::is_ancestor_or_self(node.path(), target.path())
        });
        if into_itself {
            warn!("Rejected drop of {} into itself", target.path());
            return None;
        }

        let dragged = self.dragged.take()?;
        let pending = PendingMove {
            node_ids: dragged.ids(),
            source_directory_id: source_directory_id.to_string(),
            destination: target.path().to_string(),
        };
        self.last_error = None;
        self.pending.insert(request, pending.clone());
        Some(pending)
    }

    pub fn end(&mut self) {
        self.dragged = None;
    }

    /// Take the move that `request` belongs to
    pub fn complete(&mut self, request: RequestId) -> Option<PendingMove> {
        self.pending.remove(&request)
    }

    pub fn fail(&mut self, request: RequestId, error: ApiError) -> Option<PendingMove> {
        let pending = self.pending.remove(&request)?;
        self.last_error = Some(error);
        Some(pending)
    }
}
