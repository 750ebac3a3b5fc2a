//! Node snapshots returned by the remote store
//!
//! Nodes are immutable values. The engine never edits one in place; it
//! replaces or removes whole list entries instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path;

/// Stable, opaque node identifier assigned by the server
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Directory,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cipher {
    Aes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compression {
    Gzip,
    Deflate,
}

/// Attributes shared by directories and files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub id: NodeId,
    pub path: String,
    pub name: String,
    pub creation: DateTime<Utc>,
    pub modification: DateTime<Utc>,
    #[serde(default)]
    pub hidden: bool,
    pub owner: String,
}

impl NodeMeta {
    /// Fresh metadata for a node created now at `path` (must be normalized)
    pub fn new(path: &str, owner: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            path: path.to_string(),
            name: path::file_name(path).to_string(),
            creation: now,
            modification: now,
            hidden: path::file_name(path).starts_with('.'),
            owner: owner.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(flatten)]
    pub meta: NodeMeta,
}

impl Directory {
    pub fn new(path: &str, owner: &str) -> Self {
        Self {
            meta: NodeMeta::new(path, owner),
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn path(&self) -> &str {
        &self.meta.path
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub size: u64,
    #[serde(default)]
    pub hash: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<Cipher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    #[serde(default)]
    pub has_thumbnail: bool,
}

impl File {
    pub fn new(path: &str, owner: &str, size: u64) -> Self {
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let has_thumbnail = mime_type.starts_with("image/");
        Self {
            meta: NodeMeta::new(path, owner),
            size,
            hash: String::new(),
            mime_type,
            cipher: None,
            compression: None,
            has_thumbnail,
        }
    }

    /// Size formatted with binary units, e.g. `1.5 KiB`
    pub fn human_readable_size(&self) -> String {
        const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
        let mut value = self.size as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", self.size, UNITS[0])
        } else {
            format!("{:.1} {}", value, UNITS[unit])
        }
    }
}

/// A file or directory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "nodeType")]
pub enum Node {
    #[serde(rename = "DIRECTORY")]
    Directory(Directory),
    #[serde(rename = "FILE")]
    File(File),
}

impl Node {
    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Directory(directory) => &directory.meta,
            Node::File(file) => &file.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn path(&self) -> &str {
        &self.meta().path
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Directory(_) => NodeType::Directory,
            Node::File(_) => NodeType::File,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Node::Directory(directory) => Some(directory),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }
}

impl From<Directory> for Node {
    fn from(directory: Directory) -> Self {
        Node::Directory(directory)
    }
}

impl From<File> for Node {
    fn from(file: File) -> Self {
        Node::File(file)
    }
}
