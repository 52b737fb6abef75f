//! # WSI Transfer
//!
//! Upload and download of multi-file Whole Slide Images (WSI) through a slide
//! management service.
//!
//! Slides in formats such as MRXS or VSI are made of a main file plus a
//! directory of companion files that easily reach several gigabytes. This
//! library moves such a slide as one logical unit: it registers a manifest of
//! all files with the service, uploads each file with the protocol the service
//! asks for, and finalizes the transfer. Downloads go the other way and keep
//! the slide's directory layout.
//!
//! ## Features
//!
//! - **Four upload backends**: direct POST to the service, presigned single
//!   PUT, S3-style multipart and Azure-style block blob
//! - **Streaming I/O**: files are read in chunks; only presigned single PUTs
//!   buffer a whole file
//! - **Unified progress**: one event stream per file regardless of backend
//! - **Fail-fast**: the first failure ends the transfer with a structured error
//! - **Cancellation**: every request races a session-wide cancellation token
//!
//! ## Architecture
//!
//! - [`manifest`] - Slide file discovery and transfer manifests
//! - [`client`] - Service API trait, HTTP client and wire models
//! - [`upload`] - Validation, backend descriptors, strategies and orchestrator
//! - [`download`] - Download engine
//! - [`progress`] - Progress events and sinks
//! - [`session`] - Per-session context (URL, session id, HTTP client)
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsi_transfer::{upload_slide, ConsoleProgress, TransferOptions, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let request = UploadRequest::new(
//!         "https://pma.example.org/core/",
//!         "session-id",
//!         "/scans/CMU-1.mrxs",
//!         "Incoming/2024",
//!     );
//!
//!     let outcome = upload_slide(
//!         request,
//!         TransferOptions::default(),
//!         Arc::new(ConsoleProgress::new()),
//!         None,
//!     )
//!     .await;
//!
//!     if let Some(reason) = outcome.failure_reason() {
//!         eprintln!("upload failed: {}", reason);
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod manifest;
pub mod progress;
pub mod session;
pub mod upload;

// Re-export commonly used types
pub use client::{CoreClient, RemoteFile, RemoteStream, TransferApi, UploadStatus};
pub use config::{Cli, Command, ConnectionArgs, DownloadConfig, UploadConfig};
pub use download::{
    DownloadEngine, DownloadOptions, DownloadReport, DownloadedFile, DEFAULT_DOWNLOAD_CHUNK_SIZE,
};
pub use error::{TransferError, ValidationError};
pub use manifest::{discover_slide_files, FileEntry, TransferManifest};
pub use progress::{ConsoleProgress, FileProgress, NoProgress, ProgressEvent, ProgressSink};
pub use session::{normalize_server_url, SessionContext};
pub use upload::{
    upload_slide, BackendDescriptor, BackendKind, MultipartPlan, PartETag, PartRange,
    StorageKind, TransferId, TransferOptions, TransferOrchestrator, TransferOutcome,
    TransferReport, TransferState, UploadRequest, UploadStrategy, ValidatedUpload,
};
