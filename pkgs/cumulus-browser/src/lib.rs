//! Cumulus Browser
//!
//! Client-side state engine for browsing a remote file tree: the current
//! directory, its incrementally loaded content, a tri-state selection, a
//! debounced search overlay, drag-and-drop moves and an upload queue.
//!
//! [`Engine`] is a pure state machine: commands and remote outcomes go in,
//! [`Effect`]s come out. [`BrowserSession`] runs an engine on tokio against
//! any [`cumulus_fs::RemoteFs`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cumulus_browser::{BrowserConfig, BrowserSession, Command};
//! use cumulus_fs::MemoryFs;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fs = Arc::new(MemoryFs::new("alice"));
//! fs.add_file("/docs/report.pdf", 2048)?;
//!
//! let (session, _events) = BrowserSession::spawn(BrowserConfig::default(), fs)?;
//! session.dispatch(Command::Navigate { path: "/docs".into() }).await?;
//! let snapshot = session.wait_for(|s| s.is_complete()).await?;
//! assert_eq!(snapshot.content.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod drag;
pub mod engine;
pub mod error;
pub mod events;
pub mod ids;
pub mod navigator;
pub mod paginator;
pub mod search;
pub mod selection;
pub mod session;
pub mod snapshot;
pub mod upload;

pub use config::BrowserConfig;
pub use drag::{DragMove, DraggedSelection, PendingMove, Pointer};
pub use engine::{Command, Effect, Engine, Outcome};
pub use error::{BrowserError, Result};
pub use events::BrowserEvent;
pub use ids::{RequestId, TaskId, TimerId};
pub use navigator::DirectoryView;
pub use paginator::{should_load_more, PageWindow, PagedContent};
pub use search::{SearchOverlay, TimerChange};
pub use selection::{selected_nodes, Selection};
pub use session::{BrowserSession, Message, SessionHandle};
pub use snapshot::BrowserSnapshot;
pub use upload::{TaskPatch, UploadQueue, UploadStatus, UploadTask};
