//! Error types for alti-cli
//!
//! This module defines the error hierarchy that covers:
//! - Local file errors (walking, digesting)
//! - Remote service errors (transport, query)
//! - Validation errors raised by precondition checks
//! - Per-item errors recorded while polling remote state
//! - Upload orchestration errors
//!
//! Per-item errors (`FileError`, `ItemError`) travel inside result records
//! and never abort a batch. Everything else aborts the running command.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the alti-cli application
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Directory traversal errors
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),

    /// Remote service errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Upload orchestration errors
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Image export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be at most {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid skip pattern
    #[error("Invalid skip pattern '{pattern}': {reason}")]
    InvalidSkipPattern { pattern: String, reason: String },

    /// Invalid timeout
    #[error("Invalid timeout {secs}s: must be positive")]
    InvalidTimeout { secs: u64 },

    /// Endpoint missing or malformed
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Project id is empty
    #[error("Project id must not be empty")]
    MissingProjectId,

    /// Only one half of the direct listener address was given
    #[error("Direct listener needs both --ip and --port")]
    IncompleteDirectAddr,
}

/// Errors computing the digest of a single file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    /// File could not be opened or read
    #[error("Failed to read '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    /// Size could not be determined
    #[error("Unknown filesize for '{path}': {reason}")]
    Filesize { path: String, reason: String },

    /// Image dimension could not be decoded
    #[error("Unknown image dimension for '{path}': {reason}")]
    Dimension { path: String, reason: String },

    /// Checksum could not be computed
    #[error("Unknown checksum for '{path}': {reason}")]
    Checksum { path: String, reason: String },
}

/// Directory traversal errors, reported on the walker's completion channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalkError {
    /// Root does not exist or cannot be resolved
    #[error("Invalid root '{path}': {reason}")]
    InvalidRoot { path: String, reason: String },

    /// Failed while reading a directory
    #[error("Failed to read directory '{path}': {reason}")]
    ReadDirFailed { path: String, reason: String },
}

/// Remote service errors
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// Network failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Errors returned inside a query response
    #[error("Query error: {0}")]
    Query(String),

    /// Response could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

/// Validation errors raised before any file or network work begins
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// Server is read-only
    #[error("server: read-only")]
    ReadOnly,

    /// Server is offline or unreachable
    #[error("server: offline")]
    Offline,

    /// Project missing or of the wrong kind
    #[error("project: not found")]
    ProjectNotFound,

    /// Local file missing
    #[error("file: not found '{0}'")]
    FileNotFound(String),

    /// Local path is not a directory
    #[error("file: not a directory '{0}'")]
    NotDirectory(String),

    /// Filename not in the allow-list
    #[error("file: invalid meta filename '{0}'")]
    MetaFilenameInvalid(String),

    /// Filename does not match the required pattern
    #[error("file: invalid model filename '{0}'")]
    ModelFilenameInvalid(String),

    /// Upload method not supported by the server
    #[error("upload: invalid method '{0}'")]
    UploadMethodInvalid(String),

    /// Local listener not visible to the server
    #[error("client: invisible at '{0}'")]
    ClientInvisible(String),

    /// A remote call made by a check failed
    #[error("remote: {0}")]
    Remote(String),
}

/// Byte transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Registration did not provide a destination
    #[error("No upload URL for item {0}")]
    MissingDestination(String),

    /// Local file could not be read
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Upload request failed
    #[error("Upload failed: {0}")]
    Remote(#[from] RemoteError),

    /// Direct upload listener failed
    #[error("Direct upload listener error: {0}")]
    Listener(String),

    /// Transfer aborted by cancellation
    #[error("Transfer cancelled")]
    Cancelled,
}

/// Per-item error recorded on a tracked item
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// Client-side timeout elapsed before a terminal state
    #[error("client: timeout")]
    Timeout,

    /// Aborted by the user
    #[error("aborted by user")]
    Cancelled,

    /// Server marked the item invalid
    #[error("{0}")]
    Invalid(String),

    /// State query failed
    #[error("transport: {0}")]
    Transport(String),

    /// Registration or transfer failed before polling
    #[error("registration: {0}")]
    Registration(String),
}

impl ItemError {
    /// Default message for an invalid item without server errors
    pub const INVALID_DEFAULT: &'static str = "image: invalid";

    /// Returns true if the user aborted the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ItemError::Cancelled)
    }
}

/// Upload orchestration errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// Precondition check failed
    #[error("Precondition failed: {0}")]
    Check(#[from] CheckError),

    /// Bucket or method could not be resolved
    #[error("Bucket selection failed: {0}")]
    Bucket(String),

    /// Registration failed
    #[error("Registration failed: {0}")]
    Register(RemoteError),

    /// Transfer failed
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Image pipeline could not start its workers
    #[error("Pipeline failed: {0}")]
    Worker(#[from] WorkerError),

    /// Item reached a non-ready outcome
    #[error("Item ended in state {state:?}: {message}")]
    Rejected { state: String, message: String },

    /// Aborted by the user
    #[error("Upload aborted by user")]
    Cancelled,
}

/// Errors exporting a project's image list
#[derive(Error, Debug)]
pub enum ExportError {
    /// Precondition check failed
    #[error("Precondition failed: {0}")]
    Check(#[from] CheckError),

    /// Listing or downloading failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// CSV output could not be written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Output file or download directory failed
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Aborted by the user
    #[error("Export aborted by user")]
    Cancelled,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },

    /// Worker could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },
}

/// Result type alias for CliError
pub type Result<T> = std::result::Result<T, CliError>;

/// Result type alias for RemoteError
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_cancelled() {
        assert!(ItemError::Cancelled.is_cancelled());
        assert!(!ItemError::Timeout.is_cancelled());
        assert_eq!(ItemError::Timeout.to_string(), "client: timeout");
    }

    #[test]
    fn test_error_conversion() {
        let check = CheckError::ProjectNotFound;
        let upload: UploadError = check.into();
        assert!(matches!(upload, UploadError::Check(CheckError::ProjectNotFound)));

        let cli: CliError = upload.into();
        assert!(matches!(cli, CliError::Upload(_)));
    }

    #[test]
    fn test_invalid_message_passthrough() {
        let e = ItemError::Invalid("corrupt".into());
        assert_eq!(e.to_string(), "corrupt");
    }
}
