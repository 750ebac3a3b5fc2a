//! The seam between the browsing engine and the remote store
//!
//! Transport details (HTTP, retries, authentication) live behind this trait.
//! Implementations report every failure as an [`ApiError`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ApiError;
use crate::node::{Directory, Node, NodeId};
use crate::types::{ContentPage, FileHandle, NodeTypeFilter, Search, SearchPage, UploadOptions};

/// Receives upload progress as a percentage in `0..=100`.
///
/// Implementations must report monotonically increasing values for a
/// single upload; the engine passes them through unchanged.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Fetch the directory record at `path` (without its content)
    async fn fetch_directory(&self, path: &str) -> Result<Directory, ApiError>;

    /// Fetch `limit` children of a directory starting at `offset`, in server order
    async fn fetch_content_page(
        &self,
        directory_id: &str,
        offset: usize,
        limit: usize,
        node_type: Option<NodeTypeFilter>,
    ) -> Result<ContentPage, ApiError>;

    /// Search below `path`
    async fn search_page(
        &self,
        path: &str,
        search: &Search,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage, ApiError>;

    /// Upload one file into the directory at `target_path`
    async fn upload_file(
        &self,
        target_path: &str,
        file: &FileHandle,
        options: &UploadOptions,
        on_progress: ProgressCallback,
    ) -> Result<Node, ApiError>;

    /// Move nodes into the directory at `destination`. All or nothing.
    async fn move_nodes(&self, node_ids: &[NodeId], destination: &str)
        -> Result<Vec<Node>, ApiError>;

    /// Create a directory at `path`
    async fn create_directory(&self, path: &str) -> Result<Directory, ApiError>;

    /// Delete nodes. Non-empty directories are only removed with `delete_content`.
    async fn delete_nodes(
        &self,
        node_ids: &[NodeId],
        delete_content: bool,
    ) -> Result<Vec<Node>, ApiError>;
}
