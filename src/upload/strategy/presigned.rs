use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;

use super::{read_chunked, SourceFile, UploadStrategy};
use crate::client::check_status;
use crate::error::TransferError;
use crate::progress::FileProgress;
use crate::session::SessionContext;
use crate::upload::descriptor::{BackendKind, PartETag};

/// One PUT of the whole file to a presigned URL.
///
/// The file is buffered in memory first; files above `buffer_limit` are
/// refused before any byte is read.
#[derive(Debug, Clone)]
pub struct PresignedUpload {
    url: String,
    read_chunk_size: usize,
    buffer_limit: u64,
}

impl PresignedUpload {
    pub fn new(url: impl Into<String>, read_chunk_size: usize, buffer_limit: u64) -> Self {
        Self {
            url: url.into(),
            read_chunk_size,
            buffer_limit,
        }
    }
}

#[async_trait]
impl UploadStrategy for PresignedUpload {
    fn kind(&self) -> BackendKind {
        BackendKind::PresignedSingle
    }

    async fn upload(
        &self,
        ctx: &SessionContext,
        source: SourceFile,
        progress: &FileProgress,
    ) -> Result<Vec<PartETag>, TransferError> {
        let SourceFile { entry, mut file } = source;

        if entry.length_bytes > self.buffer_limit {
            return Err(TransferError::InvalidDescriptor(format!(
                "{} bytes exceed the single PUT limit of {} bytes",
                entry.length_bytes, self.buffer_limit
            )));
        }

        let data = read_chunked(
            ctx,
            &mut file,
            entry.length_bytes,
            self.read_chunk_size,
            progress,
            0,
        )
        .await?;
        if data.len() as u64 != entry.length_bytes {
            return Err(TransferError::Io(format!(
                "read {} of {} bytes; file changed during upload",
                data.len(),
                entry.length_bytes
            )));
        }

        debug!("PUT {} bytes to presigned URL", data.len());
        let request = ctx
            .http()
            .put(&self.url)
            .header(CONTENT_LENGTH, data.len())
            .body(data);
        let response = ctx.send(request).await?;
        check_status("presigned upload", response).await?;

        Ok(Vec::new())
    }
}
