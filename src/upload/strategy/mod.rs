//! Backend upload strategies.
//!
//! Each strategy moves the bytes of one file using one wire protocol. They are
//! interchangeable behind [`UploadStrategy`]; the orchestrator picks one per
//! file with [`for_plan`] and never inspects which it got.
//!
//! Strategies report progress for every local read and return the part ETags
//! needed to complete a multipart upload (empty for the other protocols).

mod block_blob;
mod direct;
mod multipart;
mod presigned;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::descriptor::{BackendKind, FilePlan, PartETag, TransferId};
use super::TransferOptions;
use crate::error::TransferError;
use crate::manifest::FileEntry;
use crate::progress::FileProgress;
use crate::session::SessionContext;

pub use block_blob::{block_id, BlockBlobUpload};
pub use direct::DirectUpload;
pub use multipart::MultipartUpload;
pub use presigned::PresignedUpload;

/// A manifest entry with its local file opened for reading.
#[derive(Debug)]
pub struct SourceFile {
    pub entry: FileEntry,
    pub file: tokio::fs::File,
}

impl SourceFile {
    /// Open the local file behind `entry`.
    pub async fn open(entry: FileEntry, path: &std::path::Path) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self { entry, file })
    }
}

/// Uploads the bytes of one file to one backend.
#[async_trait]
pub trait UploadStrategy: Send + Sync {
    /// Protocol this strategy speaks.
    fn kind(&self) -> BackendKind;

    /// Upload the whole file.
    ///
    /// Returns the part ETags sorted by part number for multipart uploads and
    /// an empty list otherwise. Any non-2xx response aborts the file.
    async fn upload(
        &self,
        ctx: &SessionContext,
        source: SourceFile,
        progress: &FileProgress,
    ) -> Result<Vec<PartETag>, TransferError>;
}

/// Build the strategy for one file's plan.
pub fn for_plan(
    plan: &FilePlan<'_>,
    transfer_id: &TransferId,
    options: &TransferOptions,
) -> Box<dyn UploadStrategy> {
    match plan {
        FilePlan::Direct => Box::new(DirectUpload::new(
            transfer_id.clone(),
            options.read_chunk_size,
        )),
        FilePlan::PresignedSingle { url } => Box::new(PresignedUpload::new(
            *url,
            options.read_chunk_size,
            options.presigned_buffer_limit,
        )),
        FilePlan::Multipart { plan } => Box::new(MultipartUpload::new(
            (*plan).clone(),
            options.read_chunk_size,
            options.part_concurrency,
        )),
        FilePlan::BlockBlob { url } => Box::new(BlockBlobUpload::new(*url, options.block_size)),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Read up to `limit` bytes in `chunk_size` reads, reporting each read.
///
/// Returns fewer than `limit` bytes only at end of file. Cancellation is
/// checked before every read.
pub(crate) async fn read_chunked<R>(
    ctx: &SessionContext,
    reader: &mut R,
    limit: u64,
    chunk_size: usize,
    progress: &FileProgress,
    part_number: u32,
) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin + Send,
{
    let limit = usize::try_from(limit)
        .map_err(|_| TransferError::Io(format!("{} bytes do not fit in memory", limit)))?;
    let chunk_size = chunk_size.max(1);
    let mut buf = vec![0u8; limit];
    let mut filled = 0;

    while filled < limit {
        if ctx.cancellation_token().is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let end = (filled + chunk_size).min(limit);
        let n = reader.read(&mut buf[filled..end]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        progress.advance(n as u64, part_number);
    }

    buf.truncate(filled);
    Ok(buf)
}

/// Append `query` to `url`, using `?` or `&` as needed.
pub(crate) fn with_query(url: &str, query: &str) -> String {
    if url.contains('?') {
        format!("{}&{}", url, query)
    } else {
        format!("{}?{}", url, query)
    }
}
