use cumulus_fs::{path, ApiError, Directory};
use tracing::debug;

use crate::ids::RequestId;

/// Where the user currently is
#[derive(Debug, Clone, Default)]
pub struct DirectoryView {
    current: Option<Directory>,
    loading: bool,
    error: Option<ApiError>,
    requested_path: Option<String>,
    latest_request: Option<RequestId>,
}

impl DirectoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Directory> {
        self.current.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Path of the last navigation request
    pub fn requested_path(&self) -> Option<&str> {
        self.requested_path.as_deref()
    }

    /// Start navigating to a normalized `path`.
    ///
    /// The previous directory is dropped right away so that nothing from it
    /// can be shown alongside the new request.
    pub fn begin(&mut self, path: String, request: RequestId) {
        self.current = None;
        self.loading = true;
        self.error = None;
        self.requested_path = Some(path);
        self.latest_request = Some(request);
    }

    fn accepts(&self, request: RequestId) -> bool {
        if self.latest_request == Some(request) {
            true
        } else {
            debug!(
                "Discarding stale directory response {} (waiting for {:?})",
                request, self.latest_request
            );
            false
        }
    }

    pub fn apply_directory(&mut self, request: RequestId, directory: Directory) -> bool {
        if !self.accepts(request) {
            return false;
        }
        self.latest_request = None;
        self.loading = false;
        self.current = Some(directory);
        true
    }

    pub fn apply_error(&mut self, request: RequestId, error: ApiError) -> bool {
        if !self.accepts(request) {
            return false;
        }
        self.latest_request = None;
        self.loading = false;
        self.current = None;
        self.error = Some(error);
        true
    }

    /// Whether a path observed by the router differs from the one this view
    /// was last asked to show
    pub fn needs_refresh(&self, observed_path: &str) -> bool {
        match path::normalize(observed_path) {
            Ok(observed) => self.requested_path.as_deref() != Some(observed.as_str()),
            Err(_) => false,
        }
    }
}
