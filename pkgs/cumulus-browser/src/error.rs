use thiserror::Error;

use crate::ids::TaskId;

/// Errors returned by the engine's command surface.
///
/// Remote failures are never reported here: they are stored in the state
/// slot they belong to and surfaced through snapshots and events.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("No current directory")]
    NoCurrentDirectory,
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Upload task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Upload task {0} can only be edited while ready")]
    TaskNotEditable(TaskId),
    #[error("Upload task {0} is uploading")]
    TaskBusy(TaskId),
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Browser session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, BrowserError>;
