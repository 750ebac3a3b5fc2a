//! Error types for the remote file tree

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Key reported when a node or path does not exist
pub const NOT_FOUND_KEY: &str = "api-error.not-found";
/// Key reported when the session may not access a node
pub const FORBIDDEN_KEY: &str = "api-error.forbidden";
/// Key reported when the target already exists
pub const CONFLICT_KEY: &str = "api-error.conflict";
/// Key reported when the request payload is rejected
pub const BAD_REQUEST_KEY: &str = "api-error.bad-request";
/// Key reported when the request never reached the server
pub const TRANSPORT_KEY: &str = "api-error.transport";

/// Error returned by every remote operation.
///
/// The shape is stable across all collaborator calls. Consumers branch on
/// `key` and on the presence of `errors`, never on `message`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{key}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub key: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<ApiError>>>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ApiError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            errors: None,
            args: Vec::new(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(NOT_FOUND_KEY, format!("Node not found: {}", path)).with_arg(path)
    }

    pub fn forbidden(path: &str) -> Self {
        Self::new(FORBIDDEN_KEY, format!("Access forbidden: {}", path)).with_arg(path)
    }

    pub fn conflict(path: &str) -> Self {
        Self::new(CONFLICT_KEY, format!("Node already exists: {}", path)).with_arg(path)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(TRANSPORT_KEY, message)
    }

    /// Validation failure on a single payload field
    pub fn invalid_field(field: &str, error: ApiError) -> Self {
        Self::new(BAD_REQUEST_KEY, "Invalid request").with_field_error(field, error)
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_field_error(mut self, field: &str, error: ApiError) -> Self {
        self.errors
            .get_or_insert_with(HashMap::new)
            .entry(field.to_string())
            .or_default()
            .push(error);
        self
    }

    pub fn has_field_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    pub fn is_not_found(&self) -> bool {
        self.key == NOT_FOUND_KEY
    }

    /// Message to show to a user: the first field error when present,
    /// otherwise the top-level message.
    pub fn display_message(&self) -> &str {
        let first_field = self.errors.as_ref().and_then(|errors| {
            let mut fields: Vec<&String> = errors.keys().collect();
            fields.sort();
            fields
                .into_iter()
                .find_map(|field| errors.get(field).and_then(|list| list.first()))
        });

        match first_field {
            Some(error) => &error.message,
            None => &self.message,
        }
    }
}

/// Errors raised by local helpers (path handling, file inspection)
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
