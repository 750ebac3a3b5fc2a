//! Cumulus remote file tree
//!
//! Data model and collaborator contract for a remote, hierarchical file
//! store. The browsing engine in `cumulus-browser` only talks to the store
//! through the [`RemoteFs`] trait.
//!
//! # Example
//!
//! ```no_run
//! use cumulus_fs::{MemoryFs, RemoteFs};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = MemoryFs::new("alice");
//! fs.add_file("/docs/report.pdf", 2048)?;
//!
//! let docs = fs.fetch_directory("/docs").await?;
//! let page = fs.fetch_content_page(docs.id(), 0, 50, None).await?;
//! assert_eq!(page.total_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod node;
pub mod path;
pub mod remote;
pub mod types;

pub use error::{ApiError, FsError};
pub use memory::{MemoryFs, Operation, CHUNK_SIZE};
pub use node::{Cipher, Compression, Directory, File, Node, NodeId, NodeMeta, NodeType};
pub use remote::{ProgressCallback, RemoteFs};
pub use types::{
    ContentPage, FileHandle, FilePath, NodeTypeFilter, Search, SearchPage, UploadOptions,
};
