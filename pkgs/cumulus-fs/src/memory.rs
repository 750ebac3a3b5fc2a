//! In-process implementation of [`RemoteFs`]
//!
//! Used by tests and by the demo shell. Supports failure injection and
//! artificial latency so that out-of-order responses can be reproduced.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

use crate::error::{ApiError, FsError, BAD_REQUEST_KEY};
use crate::node::{Directory, File, Node, NodeId};
use crate::path;
use crate::remote::{ProgressCallback, RemoteFs};
use crate::types::{
    ContentPage, FileHandle, FilePath, NodeTypeFilter, Search, SearchPage, UploadOptions,
};

/// Size of the slices used to report upload progress (256KB)
pub const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchDirectory,
    FetchContentPage,
    SearchPage,
    UploadFile,
    MoveNodes,
    CreateDirectory,
    DeleteNodes,
}

struct Fault {
    operation: Operation,
    target: Option<String>,
    error: ApiError,
}

pub struct MemoryFs {
    owner: String,
    nodes: RwLock<BTreeMap<String, Node>>,
    faults: Mutex<Vec<Fault>>,
    latency: RwLock<HashMap<String, Duration>>,
    default_latency: RwLock<Duration>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl MemoryFs {
    pub fn new(owner: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            path::ROOT.to_string(),
            Node::from(Directory::new(path::ROOT, owner)),
        );

        Self {
            owner: owner.to_string(),
            nodes: RwLock::new(nodes),
            faults: Mutex::new(Vec::new()),
            latency: RwLock::new(HashMap::new()),
            default_latency: RwLock::new(Duration::ZERO),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Create a directory and any missing parents
    pub fn add_directory(&self, dir_path: &str) -> Result<Directory, FsError> {
        let dir_path = path::normalize(dir_path)?;
        let mut nodes = self.nodes.write();
        Ok(Self::ensure_directory(&mut nodes, &dir_path, &self.owner))
    }

    /// Create a file (and any missing parent directories)
    pub fn add_file(&self, file_path: &str, size: u64) -> Result<File, FsError> {
        let file_path = path::normalize(file_path)?;
        if file_path == path::ROOT {
            return Err(FsError::InvalidPath("the root is a directory".to_string()));
        }
        let mut nodes = self.nodes.write();
        if let Some(parent) = path::parent(&file_path) {
            Self::ensure_directory(&mut nodes, parent, &self.owner);
        }
        let file = File::new(&file_path, &self.owner, size);
        debug!("Seeded {} ({} bytes)", file_path, size);
        nodes.insert(file_path, Node::from(file.clone()));
        Ok(file)
    }

    fn ensure_directory(
        nodes: &mut BTreeMap<String, Node>,
        dir_path: &str,
        owner: &str,
    ) -> Directory {
        if let Some(Node::Directory(existing)) = nodes.get(dir_path) {
            return existing.clone();
        }
        if let Some(parent) = path::parent(dir_path) {
            Self::ensure_directory(nodes, parent, owner);
        }
        let directory = Directory::new(dir_path, owner);
        nodes.insert(dir_path.to_string(), Node::from(directory.clone()));
        directory
    }

    pub fn node(&self, node_path: &str) -> Option<Node> {
        self.nodes.read().get(node_path).cloned()
    }

    /// Make `operation` fail with `error`; `target` restricts the fault to a
    /// path, file name or destination.
    pub fn inject_failure(&self, operation: Operation, target: Option<&str>, error: ApiError) {
        self.faults.lock().push(Fault {
            operation,
            target: target.map(str::to_string),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.faults.lock().clear();
    }

    /// Delay every call touching `target` (a path or file name)
    pub fn set_latency(&self, target: &str, latency: Duration) {
        self.latency.write().insert(target.to_string(), latency);
    }

    pub fn set_default_latency(&self, latency: Duration) {
        *self.default_latency.write() = latency;
    }

    /// Number of calls received for `operation`
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    async fn enter(&self, operation: Operation, target: &str) -> Result<(), ApiError> {
        *self.calls.lock().entry(operation).or_insert(0) += 1;

        let latency = self
            .latency
            .read()
            .get(target)
            .copied()
            .unwrap_or(*self.default_latency.read());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let faults = self.faults.lock();
        let fault = faults.iter().find(|fault| {
            fault.operation == operation
                && fault.target.as_deref().map_or(true, |t| t == target)
        });
        match fault {
            Some(fault) => {
                debug!(?operation, target, "Injected failure");
                Err(fault.error.clone())
            }
            None => Ok(()),
        }
    }

    fn children<'a>(nodes: &'a BTreeMap<String, Node>, dir_path: &str) -> Vec<&'a Node> {
        let mut children: Vec<&Node> = nodes
            .values()
            .filter(|node| path::parent(node.path()) == Some(dir_path))
            .collect();
        // Directories first, then by name
        children.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name().cmp(b.name()))
        });
        children
    }

    fn find_by_id<'a>(nodes: &'a BTreeMap<String, Node>, id: &str) -> Option<&'a Node> {
        nodes.values().find(|node| node.id() == id)
    }

    fn directory_at(nodes: &BTreeMap<String, Node>, dir_path: &str) -> Result<Directory, ApiError> {
        match nodes.get(dir_path) {
            Some(Node::Directory(directory)) => Ok(directory.clone()),
            Some(Node::File(_)) => Err(ApiError::new(
                BAD_REQUEST_KEY,
                format!("Not a directory: {}", dir_path),
            )
            .with_arg(dir_path)),
            None => Err(ApiError::not_found(dir_path)),
        }
    }

    fn normalized(raw: &str) -> Result<String, ApiError> {
        path::normalize(raw).map_err(|e| ApiError::new(BAD_REQUEST_KEY, e.to_string()))
    }

    /// Re-key `node` and everything below it under `new_path`
    fn relocate(nodes: &mut BTreeMap<String, Node>, old_path: &str, new_path: &str) -> Node {
        let affected: Vec<String> = nodes
            .keys()
            .filter(|p| path::is_ancestor_or_self(old_path, p))
            .cloned()
            .collect();

        let mut moved_root = None;
        for key in affected {
            if let Some(mut node) = nodes.remove(&key) {
                let rewritten = format!("{}{}", new_path, &key[old_path.len()..]);
                let meta = match &mut node {
                    Node::Directory(directory) => &mut directory.meta,
                    Node::File(file) => &mut file.meta,
                };
                meta.path = rewritten.clone();
                meta.name = path::file_name(&rewritten).to_string();
                meta.modification = chrono::Utc::now();
                if key == old_path {
                    moved_root = Some(node.clone());
                }
                nodes.insert(rewritten, node);
            }
        }
        moved_root.unwrap_or_else(|| Node::from(Directory::new(new_path, "")))
    }

    async fn read_source(file: &FileHandle) -> Result<Vec<u8>, ApiError> {
        match &file.source {
            FilePath::Bytes(bytes) => Ok(bytes.clone()),
            FilePath::Path(local) => tokio::fs::read(local)
                .await
                .map_err(|e| ApiError::transport(format!("Cannot read {}: {}", local.display(), e))),
            FilePath::Url(url) => Err(ApiError::transport(format!(
                "Content URIs cannot be read by the in-memory store: {}",
                url
            ))),
        }
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new("cumulus")
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn fetch_directory(&self, raw_path: &str) -> Result<Directory, ApiError> {
        let dir_path = Self::normalized(raw_path)?;
        self.enter(Operation::FetchDirectory, &dir_path).await?;
        Self::directory_at(&self.nodes.read(), &dir_path)
    }

    async fn fetch_content_page(
        &self,
        directory_id: &str,
        offset: usize,
        limit: usize,
        node_type: Option<NodeTypeFilter>,
    ) -> Result<ContentPage, ApiError> {
        let dir_path = Self::find_by_id(&self.nodes.read(), directory_id)
            .map(|node| node.path().to_string())
            .ok_or_else(|| ApiError::not_found(directory_id))?;
        self.enter(Operation::FetchContentPage, &dir_path).await?;

        let nodes = self.nodes.read();
        let filter = node_type.unwrap_or_default();
        let children: Vec<&Node> = Self::children(&nodes, &dir_path)
            .into_iter()
            .filter(|node| filter.matches(node))
            .collect();

        Ok(ContentPage {
            total_count: children.len(),
            items: children
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        })
    }

    async fn search_page(
        &self,
        raw_path: &str,
        search: &Search,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage, ApiError> {
        let base = Self::normalized(raw_path)?;
        self.enter(Operation::SearchPage, &base).await?;

        let nodes = self.nodes.read();
        Self::directory_at(&nodes, &base)?;
        let matches: Vec<&Node> = nodes
            .values()
            .filter(|node| node.path() != base)
            .filter(|node| {
                if search.recursive {
                    path::is_ancestor_or_self(&base, node.path())
                } else {
                    path::parent(node.path()) == Some(base.as_str())
                }
            })
            .filter(|node| search.matches(node))
            .collect();

        Ok(SearchPage {
            has_more: offset + limit < matches.len(),
            items: matches.into_iter().skip(offset).take(limit).cloned().collect(),
        })
    }

    async fn upload_file(
        &self,
        target_path: &str,
        file: &FileHandle,
        options: &UploadOptions,
        on_progress: ProgressCallback,
    ) -> Result<Node, ApiError> {
        let dir_path = Self::normalized(target_path)?;
        let file_path = path::join(&dir_path, &options.filename).map_err(|e| {
            ApiError::invalid_field("filename", ApiError::new(BAD_REQUEST_KEY, e.to_string()))
        })?;

        on_progress(0);
        self.enter(Operation::UploadFile, &options.filename).await?;

        {
            let nodes = self.nodes.read();
            Self::directory_at(&nodes, &dir_path)?;
            if nodes.contains_key(&file_path) {
                return Err(ApiError::conflict(&file_path));
            }
        }

        let content = Self::read_source(file).await?;
        let mut hasher = Sha256::new();
        let total = content.len().max(1);
        let mut sent = 0;
        for chunk in content.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
            sent += chunk.len();
            on_progress(((sent * 100) / total).min(100) as u8);
            tokio::task::yield_now().await;
        }
        on_progress(100);

        let mut created = File::new(&file_path, &self.owner, content.len() as u64);
        created.hash = format!("{:x}", hasher.finalize());
        created.cipher = options.cipher;
        created.compression = options.compression;

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&file_path) {
            return Err(ApiError::conflict(&file_path));
        }
        let node = Node::from(created);
        nodes.insert(file_path, node.clone());
        Ok(node)
    }

    async fn move_nodes(
        &self,
        node_ids: &[NodeId],
        destination: &str,
    ) -> Result<Vec<Node>, ApiError> {
        let destination = Self::normalized(destination)?;
        self.enter(Operation::MoveNodes, &destination).await?;

        let mut nodes = self.nodes.write();
        Self::directory_at(&nodes, &destination)?;

        // Validate everything before touching the tree
        let mut plan = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            let node = Self::find_by_id(&nodes, id).ok_or_else(|| ApiError::not_found(id))?;
            if path::is_ancestor_or_self(node.path(), &destination) {
                return Err(ApiError::new(
                    BAD_REQUEST_KEY,
                    format!("Cannot move {} into itself", node.path()),
                )
                .with_arg(node.path()));
            }
            let new_path = path::join(&destination, node.name())
                .map_err(|e| ApiError::new(BAD_REQUEST_KEY, e.to_string()))?;
            if nodes.contains_key(&new_path) {
                return Err(ApiError::conflict(&new_path));
            }
            plan.push((node.path().to_string(), new_path));
        }

        Ok(plan
            .into_iter()
            .map(|(old_path, new_path)| Self::relocate(&mut nodes, &old_path, &new_path))
            .collect())
    }

    async fn create_directory(&self, raw_path: &str) -> Result<Directory, ApiError> {
        let dir_path = Self::normalized(raw_path)?;
        self.enter(Operation::CreateDirectory, &dir_path).await?;

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&dir_path) {
            return Err(ApiError::conflict(&dir_path));
        }
        let parent = path::parent(&dir_path).ok_or_else(|| ApiError::conflict(&dir_path))?;
        Self::directory_at(&nodes, parent)?;

        let directory = Directory::new(&dir_path, &self.owner);
        nodes.insert(dir_path, Node::from(directory.clone()));
        Ok(directory)
    }

    async fn delete_nodes(
        &self,
        node_ids: &[NodeId],
        delete_content: bool,
    ) -> Result<Vec<Node>, ApiError> {
        self.enter(Operation::DeleteNodes, "").await?;

        let mut nodes = self.nodes.write();
        let mut targets = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            let node = Self::find_by_id(&nodes, id)
                .ok_or_else(|| ApiError::not_found(id))?
                .clone();
            if path::is_root(node.path()) {
                return Err(ApiError::forbidden(path::ROOT));
            }
            if node.is_directory()
                && !delete_content
                && !Self::children(&nodes, node.path()).is_empty()
            {
                return Err(ApiError::new(
                    BAD_REQUEST_KEY,
                    format!("Directory is not empty: {}", node.path()),
                )
                .with_arg(node.path()));
            }
            targets.push(node);
        }

        for node in &targets {
            nodes.retain(|p, _| !path::is_ancestor_or_self(node.path(), p));
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    fn seeded() -> MemoryFs {
        let fs = MemoryFs::new("alice");
        for i in 0..5 {
            fs.add_file(&format!("/docs/file-{:03}.txt", i), 10).unwrap();
        }
        fs.add_directory("/docs/archive").unwrap();
        fs.add_directory("/photos").unwrap();
        fs
    }

    #[tokio::test]
    async fn test_content_pages_in_server_order() {
        let fs = seeded();
        let docs = fs.fetch_directory("/docs").await.unwrap();

        let first = fs.fetch_content_page(docs.id(), 0, 3, None).await.unwrap();
        assert_eq!(first.total_count, 6);
        let names: Vec<&str> = first.items.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["archive", "file-000.txt", "file-001.txt"]);

        let rest = fs.fetch_content_page(docs.id(), 3, 3, None).await.unwrap();
        assert_eq!(rest.items.len(), 3);
        assert_eq!(fs.calls(Operation::FetchContentPage), 2);
    }

    #[tokio::test]
    async fn test_upload_reports_progress_and_hash() {
        let fs = seeded();
        let last = Arc::new(AtomicU8::new(0));
        let seen = last.clone();
        let handle = FileHandle::from_bytes("new.txt", vec![7u8; CHUNK_SIZE * 2 + 10]);
        let options = UploadOptions::new("new.txt", true, false);

        let node = fs
            .upload_file(
                "/docs",
                &handle,
                &options,
                Arc::new(move |p| seen.store(p, Ordering::SeqCst)),
            )
            .await
            .unwrap();

        assert_eq!(last.load(Ordering::SeqCst), 100);
        let file = node.as_file().unwrap();
        assert_eq!(file.meta.path, "/docs/new.txt");
        assert_eq!(file.hash.len(), 64);
        assert!(fs.node("/docs/new.txt").is_some());
    }

    #[tokio::test]
    async fn test_move_is_all_or_nothing() {
        let fs = seeded();
        let a = fs.node("/docs/file-000.txt").unwrap();
        let photos = fs.node("/photos").unwrap();
        fs.add_file("/photos/file-001.txt", 1).unwrap();
        let b = fs.node("/docs/file-001.txt").unwrap();

        let result = fs
            .move_nodes(&[a.id().to_string(), b.id().to_string()], photos.path())
            .await;
        assert!(result.is_err());
        assert!(fs.node("/docs/file-000.txt").is_some());
    }

    #[tokio::test]
    async fn test_move_directory_rewrites_descendants() {
        let fs = seeded();
        fs.add_file("/docs/archive/old.txt", 1).unwrap();
        let archive = fs.node("/docs/archive").unwrap();

        let moved = fs
            .move_nodes(&[archive.id().to_string()], "/photos")
            .await
            .unwrap();
        assert_eq!(moved[0].path(), "/photos/archive");
        assert!(fs.node("/photos/archive/old.txt").is_some());
        assert!(fs.node("/docs/archive/old.txt").is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_targets_path() {
        let fs = seeded();
        fs.inject_failure(
            Operation::FetchDirectory,
            Some("/photos"),
            ApiError::forbidden("/photos"),
        );
        assert!(fs.fetch_directory("/docs").await.is_ok());
        let error = fs.fetch_directory("/photos").await.unwrap_err();
        assert_eq!(error.key, crate::error::FORBIDDEN_KEY);
    }

    #[tokio::test]
    async fn test_delete_requires_delete_content_for_non_empty_directory() {
        let fs = seeded();
        let docs = fs.node("/docs").unwrap();
        assert!(fs.delete_nodes(&[docs.id().to_string()], false).await.is_err());
        assert!(fs.delete_nodes(&[docs.id().to_string()], true).await.is_ok());
        assert!(fs.node("/docs/file-000.txt").is_none());
    }
}
