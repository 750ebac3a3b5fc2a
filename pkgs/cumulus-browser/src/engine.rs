//! The browsing state machine
//!
//! [`Engine`] owns every piece of browsing state and changes it only in
//! response to a [`Command`] from the UI or an [`Outcome`] of earlier work.
//! Both return the [`Effect`]s to carry out next; the engine itself never
//! performs I/O, so every transition can be driven step by step in tests.

use cumulus_fs::{
    path, ApiError, ContentPage, Directory, FileHandle, Node, NodeId, Search, SearchPage,
    UploadOptions,
};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::drag::{DragMove, Pointer};
use crate::error::{BrowserError, Result};
use crate::events::BrowserEvent;
use crate::ids::{IdGenerator, RequestId, TaskId, TimerId};
use crate::navigator::DirectoryView;
use crate::paginator::{should_load_more, PagedContent};
use crate::search::SearchOverlay;
use crate::selection::{selected_nodes, Selection};
use crate::snapshot::BrowserSnapshot;
use crate::upload::{TaskPatch, UploadQueue};

/// Everything the UI can ask for
#[derive(Debug, Clone)]
pub enum Command {
    Navigate { path: String },
    LoadMore,
    /// The list was scrolled so that `visible_stop_index` is the last row shown
    Scrolled { visible_stop_index: usize },

    Select { id: NodeId },
    Deselect { id: NodeId },
    SelectAll,
    DeselectAll,
    ToggleSelectAll,

    SetSearch { search: Option<Search> },

    BeginDrag { node: Node, pointer: Pointer },
    MovePointer { pointer: Pointer },
    Drop { target: Node },
    EndDrag,

    StageFiles { files: Vec<FileHandle> },
    UpdateTask { id: TaskId, patch: TaskPatch },
    RemoveTask { id: TaskId },
    UploadAll,
    DismissUploads,

    CreateDirectory { name: String },
    DeleteNodes { node_ids: Vec<NodeId>, delete_content: bool },
    DeleteSelection { delete_content: bool },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Navigate { .. } => "navigate",
            Command::LoadMore => "load_more",
            Command::Scrolled { .. } => "scrolled",
            Command::Select { .. } => "select",
            Command::Deselect { .. } => "deselect",
            Command::SelectAll => "select_all",
            Command::DeselectAll => "deselect_all",
            Command::ToggleSelectAll => "toggle_select_all",
            Command::SetSearch { .. } => "set_search",
            Command::BeginDrag { .. } => "begin_drag",
            Command::MovePointer { .. } => "move_pointer",
            Command::Drop { .. } => "drop",
            Command::EndDrag => "end_drag",
            Command::StageFiles { .. } => "stage_files",
            Command::UpdateTask { .. } => "update_task",
            Command::RemoveTask { .. } => "remove_task",
            Command::UploadAll => "upload_all",
            Command::DismissUploads => "dismiss_uploads",
            Command::CreateDirectory { .. } => "create_directory",
            Command::DeleteNodes { .. } => "delete_nodes",
            Command::DeleteSelection { .. } => "delete_selection",
        }
    }
}

/// Results of remote calls and timers, fed back into the engine
#[derive(Debug, Clone)]
pub enum Outcome {
    DirectoryLoaded {
        request: RequestId,
        result: std::result::Result<Directory, ApiError>,
    },
    ContentPageLoaded {
        request: RequestId,
        result: std::result::Result<ContentPage, ApiError>,
    },
    SearchPageLoaded {
        request: RequestId,
        result: std::result::Result<SearchPage, ApiError>,
    },
    TimerFired {
        timer: TimerId,
    },
    UploadProgress {
        task: TaskId,
        progress: u8,
        at: Instant,
    },
    UploadFinished {
        task: TaskId,
        result: std::result::Result<Node, ApiError>,
    },
    MoveFinished {
        request: RequestId,
        result: std::result::Result<Vec<Node>, ApiError>,
    },
    DirectoryCreated {
        request: RequestId,
        result: std::result::Result<Directory, ApiError>,
    },
    NodesDeleted {
        request: RequestId,
        result: std::result::Result<Vec<Node>, ApiError>,
    },
}

/// Work requested by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchDirectory {
        request: RequestId,
        path: String,
    },
    FetchContentPage {
        request: RequestId,
        directory_id: String,
        offset: usize,
        limit: usize,
    },
    SearchPage {
        request: RequestId,
        path: String,
        search: Search,
        offset: usize,
        limit: usize,
    },
    UploadFile {
        task: TaskId,
        target_path: String,
        file: FileHandle,
        options: UploadOptions,
    },
    MoveNodes {
        request: RequestId,
        node_ids: Vec<NodeId>,
        destination: String,
    },
    CreateDirectory {
        request: RequestId,
        path: String,
    },
    DeleteNodes {
        request: RequestId,
        node_ids: Vec<NodeId>,
        delete_content: bool,
    },
    StartTimer {
        timer: TimerId,
        delay: Duration,
    },
    CancelTimer {
        timer: TimerId,
    },
    Notify(BrowserEvent),
}

#[derive(Debug, Clone)]
struct PendingDeletion {
    node_ids: Vec<NodeId>,
    source_directory_id: String,
}

#[derive(Debug)]
pub struct Engine {
    config: BrowserConfig,
    ids: IdGenerator,
    view: DirectoryView,
    content: PagedContent,
    search: SearchOverlay,
    selection: Selection,
    drag: DragMove,
    uploads: UploadQueue,
    creations: HashMap<RequestId, String>,
    deletions: HashMap<RequestId, PendingDeletion>,
    operation_error: Option<ApiError>,
}

/// The list currently shown: search results win over the directory listing
fn visible<'a>(search: &'a SearchOverlay, content: &'a PagedContent) -> &'a PagedContent {
    if search.is_active() {
        search.results()
    } else {
        content
    }
}

impl Engine {
    pub fn new(config: BrowserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ids: IdGenerator::default(),
            view: DirectoryView::new(),
            content: PagedContent::new(),
            search: SearchOverlay::new(),
            selection: Selection::None,
            drag: DragMove::new(),
            uploads: UploadQueue::new(),
            creations: HashMap::new(),
            deletions: HashMap::new(),
            operation_error: None,
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn view(&self) -> &DirectoryView {
        &self.view
    }

    /// The directory listing, whether or not a search hides it
    pub fn directory_content(&self) -> &PagedContent {
        &self.content
    }

    pub fn search(&self) -> &SearchOverlay {
        &self.search
    }

    pub fn visible(&self) -> &PagedContent {
        visible(&self.search, &self.content)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn drag(&self) -> &DragMove {
        &self.drag
    }

    pub fn uploads(&self) -> &UploadQueue {
        &self.uploads
    }

    pub fn operation_error(&self) -> Option<&ApiError> {
        self.operation_error.as_ref()
    }

    pub fn needs_refresh(&self, observed_path: &str) -> bool {
        self.view.needs_refresh(observed_path)
    }

    /// Apply a user command.
    ///
    /// `Err` means the command was invalid for the current state; the state
    /// is left untouched in that case.
    pub fn dispatch(&mut self, command: Command) -> Result<Vec<Effect>> {
        let effects = match command {
            Command::Navigate { path } => self.navigate(&path)?,
            Command::LoadMore => self.load_more(),
            Command::Scrolled { visible_stop_index } => {
                let shown = self.visible();
                if should_load_more(
                    visible_stop_index,
                    shown.len(),
                    shown.content_size(),
                    self.config.load_more_threshold,
                ) {
                    self.load_more()
                } else {
                    Vec::new()
                }
            }

            Command::Select { id } => {
                self.selection.select(&id);
                Vec::new()
            }
            Command::Deselect { id } => {
                let known = visible(&self.search, &self.content);
                self.selection.deselect(&id, known.ids());
                Vec::new()
            }
            Command::SelectAll => {
                self.selection.select_all();
                Vec::new()
            }
            Command::DeselectAll => {
                self.selection.deselect_all();
                Vec::new()
            }
            Command::ToggleSelectAll => {
                self.selection.toggle_all();
                Vec::new()
            }

            Command::SetSearch { search } => self.set_search(search),

            Command::BeginDrag { node, pointer } => {
                let shown = visible(&self.search, &self.content);
                self.drag.begin(node, &self.selection, shown.items(), pointer);
                Vec::new()
            }
            Command::MovePointer { pointer } => {
                self.drag.move_pointer(pointer);
                Vec::new()
            }
            Command::Drop { target } => self.drop_on(&target),
            Command::EndDrag => {
                self.drag.end();
                Vec::new()
            }

            Command::StageFiles { files } => {
                let location = self
                    .view
                    .current()
                    .map(|directory| directory.path().to_string())
                    .ok_or(BrowserError::NoCurrentDirectory)?;
                let staged = self.uploads.stage(
                    &mut self.ids,
                    files,
                    &location,
                    self.config.default_crypted,
                    self.config.default_compressed,
                );
                debug!("Staged {} file(s) for {}", staged.len(), location);
                Vec::new()
            }
            Command::UpdateTask { id, patch } => {
                self.uploads.update(id, patch)?;
                Vec::new()
            }
            Command::RemoveTask { id } => {
                self.uploads.remove(id)?;
                Vec::new()
            }
            Command::UploadAll => self.upload_all(),
            Command::DismissUploads => {
                let removed = self.uploads.dismiss();
                debug!("Dismissed {} upload task(s)", removed);
                Vec::new()
            }

            Command::CreateDirectory { name } => self.create_directory(&name)?,
            Command::DeleteNodes {
                node_ids,
                delete_content,
            } => self.delete_nodes(node_ids, delete_content)?,
            Command::DeleteSelection { delete_content } => {
                let shown = visible(&self.search, &self.content);
                let node_ids = selected_nodes(shown.items(), &self.selection)
                    .into_iter()
                    .map(|node| node.id().to_string())
                    .collect();
                self.delete_nodes(node_ids, delete_content)?
            }
        };
        Ok(effects)
    }

    /// Apply the result of earlier work
    pub fn resolve(&mut self, outcome: Outcome) -> Vec<Effect> {
        match outcome {
            Outcome::DirectoryLoaded { request, result } => self.directory_loaded(request, result),
            Outcome::ContentPageLoaded { request, result } => match result {
                Ok(page) => {
                    if self.content.apply_page(request, page.items, page.total_count) {
                        debug!(
                            "Loaded {} of {:?} items",
                            self.content.len(),
                            self.content.content_size()
                        );
                    }
                    Vec::new()
                }
                Err(error) => {
                    if self.content.apply_error(request, error.clone()) {
                        warn!("Failed to load page: {}", error);
                        vec![Effect::Notify(BrowserEvent::PageFailed { error })]
                    } else {
                        Vec::new()
                    }
                }
            },
            Outcome::SearchPageLoaded { request, result } => match result {
                Ok(page) => {
                    self.search.apply_page(request, page);
                    Vec::new()
                }
                Err(error) => {
                    if self.search.apply_error(request, error.clone()) {
                        warn!("Search failed: {}", error);
                        vec![Effect::Notify(BrowserEvent::SearchFailed { error })]
                    } else {
                        Vec::new()
                    }
                }
            },
            Outcome::TimerFired { timer } => {
                if self.search.timer_fired(timer) {
                    self.load_more()
                } else {
                    Vec::new()
                }
            }
            Outcome::UploadProgress { task, progress, at } => {
                self.uploads.record_progress(task, progress, at);
                Vec::new()
            }
            Outcome::UploadFinished { task, result } => self.upload_finished(task, result),
            Outcome::MoveFinished { request, result } => self.move_finished(request, result),
            Outcome::DirectoryCreated { request, result } => {
                self.directory_created(request, result)
            }
            Outcome::NodesDeleted { request, result } => self.nodes_deleted(request, result),
        }
    }

    pub fn snapshot(&self) -> BrowserSnapshot {
        let shown = self.visible();
        BrowserSnapshot {
            current: self.view.current().cloned(),
            requested_path: self.view.requested_path().map(str::to_string),
            directory_loading: self.view.is_loading(),
            directory_error: self.view.error().cloned(),
            content: shown.items().to_vec(),
            content_size: shown.content_size(),
            loading_more: shown.is_loading_more(),
            content_error: shown.error().cloned(),
            search: self.search.search().cloned(),
            search_pending: self.search.is_debouncing(),
            selection: self.selection.clone(),
            dragged: self.drag.dragged().cloned(),
            move_error: self.drag.last_error().cloned(),
            uploads: self.uploads.tasks().to_vec(),
            uploads_drained: self.uploads.is_drained(),
            operation_error: self.operation_error.clone(),
        }
    }

    fn navigate(&mut self, raw_path: &str) -> Result<Vec<Effect>> {
        let path = path::normalize(raw_path).map_err(|e| BrowserError::InvalidPath(e.to_string()))?;
        let request = self.ids.request();
        info!("Navigating to {}", path);

        let mut effects = Vec::new();
        if let Some(timer) = self.search.clear() {
            effects.push(Effect::CancelTimer { timer });
        }
        self.view.begin(path.clone(), request);
        self.content.reset();
        self.selection.deselect_all();
        self.operation_error = None;

        effects.push(Effect::FetchDirectory { request, path });
        Ok(effects)
    }

    fn directory_loaded(
        &mut self,
        request: RequestId,
        result: std::result::Result<Directory, ApiError>,
    ) -> Vec<Effect> {
        match result {
            Ok(directory) => {
                if !self.view.apply_directory(request, directory.clone()) {
                    return Vec::new();
                }
                info!("Opened directory {}", directory.path());
                let mut effects = self.load_more();
                effects.push(Effect::Notify(BrowserEvent::DirectoryChanged { directory }));
                effects
            }
            Err(error) => {
                if !self.view.apply_error(request, error.clone()) {
                    return Vec::new();
                }
                let path = self.view.requested_path().unwrap_or_default().to_string();
                warn!("Failed to open {}: {}", path, error);
                vec![Effect::Notify(BrowserEvent::NavigationFailed { path, error })]
            }
        }
    }

    /// Request the next page of whatever is shown
    fn load_more(&mut self) -> Vec<Effect> {
        let Some(directory) = self.view.current() else {
            debug!("No directory loaded, nothing to page");
            return Vec::new();
        };
        let page_size = self.config.page_size;
        let request = self.ids.request();

        if let Some(search) = self.search.search().cloned() {
            let path = directory.path().to_string();
            return match self.search.begin_next_page(request, page_size) {
                Some(window) => vec![Effect::SearchPage {
                    request,
                    path,
                    search,
                    offset: window.offset,
                    limit: window.limit,
                }],
                None => Vec::new(),
            };
        }

        let directory_id = directory.id().to_string();
        match self.content.begin_next_page(request, page_size) {
            Some(window) => vec![Effect::FetchContentPage {
                request,
                directory_id,
                offset: window.offset,
                limit: window.limit,
            }],
            None => Vec::new(),
        }
    }

    fn set_search(&mut self, search: Option<Search>) -> Vec<Effect> {
        let timer = self.ids.timer();
        let change = self.search.set_query(search, timer);

        let mut effects = Vec::new();
        if let Some(timer) = change.cancel {
            effects.push(Effect::CancelTimer { timer });
        }
        if let Some(timer) = change.start {
            effects.push(Effect::StartTimer {
                timer,
                delay: self.config.search_debounce(),
            });
        }
        effects
    }

    fn drop_on(&mut self, target: &Node) -> Vec<Effect> {
        let Some(source) = self.view.current() else {
            debug!("Drop ignored, no current directory");
            return Vec::new();
        };
        let source_id = source.id().to_string();
        let request = self.ids.request();

        match self.drag.drop_on(target, &source_id, request) {
            Some(pending) => {
                info!(
                    "Moving {} node(s) to {}",
                    pending.node_ids.len(),
                    pending.destination
                );
                vec![Effect::MoveNodes {
                    request,
                    node_ids: pending.node_ids,
                    destination: pending.destination,
                }]
            }
            None => Vec::new(),
        }
    }

    fn upload_all(&mut self) -> Vec<Effect> {
        let started = self.uploads.start_all();
        if !started.is_empty() {
            info!("Uploading {} file(s)", started.len());
        }
        started
            .into_iter()
            .map(|task| Effect::UploadFile {
                task: task.id,
                options: task.options(),
                target_path: task.location,
                file: task.file,
            })
            .collect()
    }

    fn upload_finished(
        &mut self,
        task: TaskId,
        result: std::result::Result<Node, ApiError>,
    ) -> Vec<Effect> {
        let current_path = self.view.current().map(|d| d.path().to_string());
        let mut effects = Vec::new();

        match result {
            Ok(node) => {
                let Some(finished) = self.uploads.complete(task) else {
                    debug!("Upload {} finished but is no longer tracked", task);
                    return effects;
                };
                info!("Uploaded {} to {}", finished.filename, finished.location);
                if current_path.as_deref() == Some(finished.location.as_str()) {
                    self.content.append(node.clone());
                }
                effects.push(Effect::Notify(BrowserEvent::UploadCompleted { task, node }));
            }
            Err(error) => {
                let Some(failed) = self.uploads.fail(task, error.clone()) else {
                    debug!("Upload {} failed but is no longer tracked", task);
                    return effects;
                };
                warn!("Upload of {} failed: {}", failed.filename, error);
                effects.push(Effect::Notify(BrowserEvent::UploadFailed {
                    task,
                    filename: failed.filename.clone(),
                    error,
                }));
            }
        }

        if self.uploads.is_drained() {
            effects.push(Effect::Notify(BrowserEvent::UploadsDrained));
        }
        effects
    }

    /// Splice removed nodes out of everything that may still show them
    fn forget_nodes(&mut self, source_directory_id: &str, node_ids: &[NodeId]) {
        let removed: HashSet<NodeId> = node_ids.iter().cloned().collect();
        let source_is_current = self
            .view
            .current()
            .is_some_and(|current| current.id() == source_directory_id);

        if source_is_current {
            let count = self.content.remove(&removed);
            debug!("Removed {} node(s) from the listing", count);
        }
        self.search.remove(&removed);
        self.selection.prune(&removed);
    }

    fn move_finished(
        &mut self,
        request: RequestId,
        result: std::result::Result<Vec<Node>, ApiError>,
    ) -> Vec<Effect> {
        match result {
            Ok(nodes) => {
                let Some(pending) = self.drag.complete(request) else {
                    debug!("Unknown move {}", request);
                    return Vec::new();
                };
                info!(
                    "Moved {} node(s) to {}",
                    pending.node_ids.len(),
                    pending.destination
                );
                self.forget_nodes(&pending.source_directory_id, &pending.node_ids);
                vec![Effect::Notify(BrowserEvent::NodesMoved {
                    nodes,
                    destination: pending.destination,
                })]
            }
            Err(error) => match self.drag.fail(request, error.clone()) {
                Some(pending) => {
                    warn!("Move to {} failed: {}", pending.destination, error);
                    vec![Effect::Notify(BrowserEvent::MoveFailed {
                        destination: pending.destination,
                        error,
                    })]
                }
                None => Vec::new(),
            },
        }
    }

    fn current_directory(&self) -> Result<&Directory> {
        self.view.current().ok_or(BrowserError::NoCurrentDirectory)
    }

    fn create_directory(&mut self, name: &str) -> Result<Vec<Effect>> {
        let parent = self.current_directory()?.path().to_string();
        let path = path::join(&parent, name.trim())
            .map_err(|_| BrowserError::InvalidFilename(name.to_string()))?;

        let request = self.ids.request();
        self.operation_error = None;
        self.creations.insert(request, parent);
        Ok(vec![Effect::CreateDirectory { request, path }])
    }

    fn directory_created(
        &mut self,
        request: RequestId,
        result: std::result::Result<Directory, ApiError>,
    ) -> Vec<Effect> {
        let Some(parent) = self.creations.remove(&request) else {
            debug!("Unknown directory creation {}", request);
            return Vec::new();
        };

        match result {
            Ok(directory) => {
                info!("Created directory {}", directory.path());
                let parent_is_current = self
                    .view
                    .current()
                    .is_some_and(|current| current.path() == parent);
                if parent_is_current {
                    self.content.append(Node::from(directory.clone()));
                }
                vec![Effect::Notify(BrowserEvent::DirectoryCreated { directory })]
            }
            Err(error) => {
                warn!("Failed to create directory in {}: {}", parent, error);
                self.operation_error = Some(error.clone());
                vec![Effect::Notify(BrowserEvent::OperationFailed { error })]
            }
        }
    }

    fn delete_nodes(&mut self, node_ids: Vec<NodeId>, delete_content: bool) -> Result<Vec<Effect>> {
        let source_directory_id = self.current_directory()?.id().to_string();
        if node_ids.is_empty() {
            debug!("Nothing to delete");
            return Ok(Vec::new());
        }

        let request = self.ids.request();
        self.operation_error = None;
        self.deletions.insert(
            request,
            PendingDeletion {
                node_ids: node_ids.clone(),
                source_directory_id,
            },
        );
        Ok(vec![Effect::DeleteNodes {
            request,
            node_ids,
            delete_content,
        }])
    }

    fn nodes_deleted(
        &mut self,
        request: RequestId,
        result: std::result::Result<Vec<Node>, ApiError>,
    ) -> Vec<Effect> {
        let Some(pending) = self.deletions.remove(&request) else {
            debug!("Unknown deletion {}", request);
            return Vec::new();
        };

        match result {
            Ok(_) => {
                info!("Deleted {} node(s)", pending.node_ids.len());
                self.forget_nodes(&pending.source_directory_id, &pending.node_ids);
                vec![Effect::Notify(BrowserEvent::NodesDeleted {
                    node_ids: pending.node_ids,
                })]
            }
            Err(error) => {
                warn!("Delete failed: {}", error);
                self.operation_error = Some(error.clone());
                vec![Effect::Notify(BrowserEvent::OperationFailed { error })]
            }
        }
    }
}
