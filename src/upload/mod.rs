//! Slide uploads.
//!
//! An upload runs in three steps:
//!
//! 1. [`UploadRequest::validate`] checks the caller's input without touching
//!    the network.
//! 2. The slide's files are collected into a [`TransferManifest`] and
//!    registered with the service, which answers with a
//!    [`BackendDescriptor`].
//! 3. The [`TransferOrchestrator`] walks the manifest and drives one
//!    [`UploadStrategy`] per file (direct POST, presigned PUT, S3 multipart or
//!    Azure block blob), then finalizes each file on the service.
//!
//! [`upload_slide`] wires these together and always returns a
//! [`TransferOutcome`].

mod descriptor;
mod orchestrator;
mod strategy;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use crate::client::CoreClient;
use crate::progress::ProgressSink;
use crate::session::SessionContext;

pub use descriptor::{
    BackendDescriptor, BackendKind, FilePlan, MultipartPlan, PartETag, PartRange, StorageKind,
    TransferId,
};
pub use orchestrator::{
    TransferOrchestrator, TransferOutcome, TransferReport, TransferState, UploadedFile,
};
pub use strategy::{
    block_id, for_plan, BlockBlobUpload, DirectUpload, MultipartUpload, PresignedUpload, SourceFile,
    UploadStrategy,
};
pub use validation::{UploadRequest, ValidatedUpload};

// =============================================================================
// Options
// =============================================================================

/// Local read granularity; one progress event per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Azure block size.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// S3 part PUTs in flight per file.
pub const DEFAULT_PART_CONCURRENCY: usize = 1;

/// Largest file buffered in memory for one presigned PUT (5 GiB, the S3
/// single-PUT ceiling).
pub const DEFAULT_PRESIGNED_BUFFER_LIMIT: u64 = 5 * 1024 * 1024 * 1024;

/// Tuning knobs for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub read_chunk_size: usize,
    pub block_size: usize,
    pub part_concurrency: usize,
    pub presigned_buffer_limit: u64,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            presigned_buffer_limit: DEFAULT_PRESIGNED_BUFFER_LIMIT,
        }
    }
}

/// Upload one local slide with all its companion files.
///
/// Every failure, including invalid input, is reported through the returned
/// [`TransferOutcome`].
pub async fn upload_slide(
    request: UploadRequest,
    options: TransferOptions,
    progress: Arc<dyn ProgressSink>,
    timeout: Option<Duration>,
) -> TransferOutcome {
    let validated = match request.validate().await {
        Ok(v) => v,
        Err(e) => return TransferOutcome::failed(e.into(), TransferState::Validating),
    };

    let ctx = match SessionContext::with_timeout(
        validated.server_url.as_str(),
        validated.session_id.clone(),
        timeout,
    ) {
        Ok(ctx) => ctx,
        Err(e) => return TransferOutcome::failed(e, TransferState::Validating),
    };

    TransferOrchestrator::new(CoreClient::new(ctx.clone()), ctx)
        .with_options(options)
        .with_progress(progress)
        .upload(&validated)
        .await
}
