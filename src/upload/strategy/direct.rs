use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{SourceFile, UploadStrategy};
use crate::client::check_status;
use crate::error::TransferError;
use crate::progress::FileProgress;
use crate::session::SessionContext;
use crate::upload::descriptor::{BackendKind, PartETag, TransferId};

/// Multipart form POST of the whole file to the service itself.
///
/// The body is streamed from disk, so memory use stays at one read chunk
/// regardless of file size.
#[derive(Debug, Clone)]
pub struct DirectUpload {
    transfer_id: TransferId,
    read_chunk_size: usize,
}

impl DirectUpload {
    pub fn new(transfer_id: TransferId, read_chunk_size: usize) -> Self {
        Self {
            transfer_id,
            read_chunk_size: read_chunk_size.max(1),
        }
    }
}

#[async_trait]
impl UploadStrategy for DirectUpload {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn upload(
        &self,
        ctx: &SessionContext,
        source: SourceFile,
        progress: &FileProgress,
    ) -> Result<Vec<PartETag>, TransferError> {
        let SourceFile { entry, file } = source;

        let mut url = ctx.endpoint(&format!("transfer/Upload/{}", self.transfer_id))?;
        url.query_pairs_mut()
            .append_pair("sessionId", ctx.session_id())
            .append_pair("path", &entry.relative_path);

        let reporter = progress.clone();
        let body = ReaderStream::with_capacity(file, self.read_chunk_size).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                reporter.advance(bytes.len() as u64, 0);
            }
            chunk
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), entry.length_bytes)
            .file_name(entry.file_name().to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        debug!(
            "POST {} bytes of {} to the service",
            entry.length_bytes, entry.relative_path
        );
        let response = ctx.send(ctx.http().post(url).multipart(form)).await?;
        check_status("direct upload", response).await?;

        Ok(Vec::new())
    }
}
