use std::path::PathBuf;

use thiserror::Error;

/// Input errors raised before any network call is made.
///
/// Every variant names the offending field so callers can surface it directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was not supplied at all
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// A required field was supplied but empty
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The server URL could not be parsed as an http(s) URL
    #[error("{field} is not a valid http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    /// A local path does not exist
    #[error("{field} does not exist: {}", path.display())]
    PathNotFound { field: &'static str, path: PathBuf },

    /// A local path exists but is a directory
    #[error("{field} is not a file: {}", path.display())]
    NotAFile { field: &'static str, path: PathBuf },

    /// A local path exists but is not a directory
    #[error("{field} is not a directory: {}", path.display())]
    NotADirectory { field: &'static str, path: PathBuf },
}

/// Errors produced by uploads and downloads.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// Bad caller input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Connection failure, timeout, DNS, or a broken response stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response from the service or a storage backend
    #[error("{operation} failed with HTTP {status}: {message}")]
    Protocol {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The service answered but the response is unusable
    #[error("{operation} returned an invalid response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    /// The service returned no files for the requested slide
    #[error("Slide not found: {0}")]
    NotFound(String),

    /// The file list violates a manifest invariant
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// The backend descriptor is inconsistent with the manifest
    #[error("Invalid backend descriptor: {0}")]
    InvalidDescriptor(String),

    /// Local file system error
    #[error("I/O error: {0}")]
    Io(String),

    /// The session's cancellation token fired
    #[error("Transfer cancelled")]
    Cancelled,

    /// A failure while processing one file of a multi-file transfer
    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Attach the relative path of the file being processed.
    pub fn for_file(self, path: impl Into<String>) -> Self {
        TransferError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any per-file wrappers.
    pub fn root(&self) -> &TransferError {
        match self {
            TransferError::File { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status code when the root cause is a protocol error.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            TransferError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), TransferError::Cancelled)
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Transport(err.to_string())
    }
}
