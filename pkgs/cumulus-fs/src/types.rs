//! Request and response types exchanged with the remote store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use url::Url;

use crate::error::FsError;
use crate::node::{Cipher, Compression, Node, NodeType};

/// Where the bytes of a staged file come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilePath {
    Url(Url),        // Android content:// or iOS file:// URIs
    Path(PathBuf),   // Regular filesystem paths
    Bytes(Vec<u8>),  // Already in memory (drag and drop, clipboard)
}

/// A local file selected or dropped by the user, not yet uploaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    pub source: FilePath,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl FileHandle {
    /// Inspect a file on disk
    pub async fn from_path(file_path: &Path) -> Result<Self, FsError> {
        let path = file_path
            .canonicalize()
            .unwrap_or_else(|_| file_path.to_path_buf());

        let metadata = fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(FsError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FsError::InvalidPath(path.display().to_string()))?
            .to_string();

        Ok(Self {
            mime_type: guess_mime_type(&name),
            source: FilePath::Path(path),
            name,
            size: metadata.len(),
        })
    }

    /// Wrap a content URI whose size is reported by the platform picker
    pub fn from_content_uri(uri: &str, name: &str, size: u64) -> Result<Self, FsError> {
        let url = Url::parse(uri).map_err(|e| FsError::InvalidPath(e.to_string()))?;
        Ok(Self {
            source: FilePath::Url(url),
            name: name.to_string(),
            size,
            mime_type: guess_mime_type(name),
        })
    }

    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            size: bytes.len() as u64,
            source: FilePath::Bytes(bytes),
            name: name.to_string(),
            mime_type: guess_mime_type(name),
        }
    }
}

fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string()
}

/// Per-upload choices made by the user before sending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub filename: String,
    pub cipher: Option<Cipher>,
    pub compression: Option<Compression>,
}

impl UploadOptions {
    pub fn new(filename: &str, crypted: bool, compressed: bool) -> Self {
        Self {
            filename: filename.to_string(),
            cipher: crypted.then_some(Cipher::Aes),
            compression: compressed.then_some(Compression::Deflate),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeTypeFilter {
    #[default]
    All,
    Directory,
    File,
}

impl NodeTypeFilter {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            NodeTypeFilter::All => true,
            NodeTypeFilter::Directory => node.node_type() == NodeType::Directory,
            NodeTypeFilter::File => node.node_type() == NodeType::File,
        }
    }
}

/// An active search over the current directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Search {
    pub query: String,
    pub node_type: NodeTypeFilter,
    #[serde(rename = "recursiveSearch")]
    pub recursive: bool,
}

impl Search {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn with_node_type(mut self, node_type: NodeTypeFilter) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Case-insensitive name match used by in-process stores
    pub fn matches(&self, node: &Node) -> bool {
        self.node_type.matches(node)
            && node
                .name()
                .to_lowercase()
                .contains(&self.query.to_lowercase())
    }
}

/// One page of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPage {
    pub items: Vec<Node>,
    pub total_count: usize,
}

/// One page of search results; the server only reports whether more exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<Node>,
    pub has_more: bool,
}
