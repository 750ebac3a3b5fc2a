use cumulus_fs::{ApiError, Directory, Node, Search};

use crate::drag::DraggedSelection;
use crate::ids::TaskId;
use crate::selection::{selected_nodes, Selection};
use crate::upload::UploadTask;

/// Read-only projection of the engine handed to the UI layer.
///
/// `content` is whatever is currently shown: the search results while a
/// query is active, the directory listing otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowserSnapshot {
    pub current: Option<Directory>,
    pub requested_path: Option<String>,
    pub directory_loading: bool,
    pub directory_error: Option<ApiError>,

    pub content: Vec<Node>,
    pub content_size: Option<usize>,
    pub loading_more: bool,
    pub content_error: Option<ApiError>,

    pub search: Option<Search>,
    /// A query change is waiting for its debounce delay
    pub search_pending: bool,

    pub selection: Selection,
    pub dragged: Option<DraggedSelection>,
    pub move_error: Option<ApiError>,

    pub uploads: Vec<UploadTask>,
    pub uploads_drained: bool,

    pub operation_error: Option<ApiError>,
}

impl BrowserSnapshot {
    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.is_selected(id)
    }

    pub fn selected_nodes(&self) -> Vec<Node> {
        selected_nodes(&self.content, &self.selection)
    }

    pub fn upload(&self, id: TaskId) -> Option<&UploadTask> {
        self.uploads.iter().find(|task| task.id == id)
    }

    pub fn is_complete(&self) -> bool {
        self.content_size
            .is_some_and(|size| self.content.len() >= size)
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current.as_ref().map(|directory| directory.path())
    }
}
