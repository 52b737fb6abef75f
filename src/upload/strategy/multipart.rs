use std::io::SeekFrom;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use tokio::io::AsyncSeekExt;
use tracing::debug;

use super::{read_chunked, SourceFile, UploadStrategy};
use crate::client::check_status;
use crate::error::TransferError;
use crate::progress::FileProgress;
use crate::session::SessionContext;
use crate::upload::descriptor::{BackendKind, MultipartPlan, PartETag, PartRange};

/// S3-style multipart upload: one PUT per planned part.
///
/// Parts are read in ascending order from the single file handle. Up to
/// `concurrency` part PUTs stay in flight, and they keep progressing while
/// the next part is read, so at most `concurrency + 1` part buffers are alive
/// at once. With the default concurrency of 1 the upload is strictly
/// sequential.
///
/// Completing the upload on the service is left to the orchestrator.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    plan: MultipartPlan,
    read_chunk_size: usize,
    concurrency: usize,
}

impl MultipartUpload {
    pub fn new(plan: MultipartPlan, read_chunk_size: usize, concurrency: usize) -> Self {
        Self {
            plan,
            read_chunk_size,
            concurrency: concurrency.max(1),
        }
    }
}

#[async_trait]
impl UploadStrategy for MultipartUpload {
    fn kind(&self) -> BackendKind {
        BackendKind::S3Multipart
    }

    async fn upload(
        &self,
        ctx: &SessionContext,
        source: SourceFile,
        progress: &FileProgress,
    ) -> Result<Vec<PartETag>, TransferError> {
        let SourceFile { entry, mut file } = source;
        let mut etags = Vec::with_capacity(self.plan.parts.len());
        let mut in_flight: FuturesUnordered<BoxFuture<'_, Result<PartETag, TransferError>>> =
            FuturesUnordered::new();
        let mut parts = self.plan.parts.iter();
        let mut next = parts.next();

        loop {
            let part = match next {
                Some(part) if in_flight.len() < self.concurrency => part,
                _ => match in_flight.next().await {
                    Some(result) => {
                        etags.push(result?);
                        continue;
                    }
                    None => break,
                },
            };

            // In-flight PUTs keep running while the next part is read.
            let read = read_part(
                ctx,
                &mut file,
                part,
                self.read_chunk_size,
                progress,
                &entry.relative_path,
            );
            tokio::pin!(read);
            let data = loop {
                tokio::select! {
                    data = &mut read => break data?,
                    Some(result) = in_flight.next(), if !in_flight.is_empty() => etags.push(result?),
                }
            };

            in_flight.push(put_part(ctx, &part.url, part.part_number, data).boxed());
            next = parts.next();
        }

        etags.sort_by_key(|e: &PartETag| e.part_number);
        Ok(etags)
    }
}

/// Seek to the part and read exactly its range.
async fn read_part(
    ctx: &SessionContext,
    file: &mut tokio::fs::File,
    part: &PartRange,
    chunk_size: usize,
    progress: &FileProgress,
    relative_path: &str,
) -> Result<Vec<u8>, TransferError> {
    file.seek(SeekFrom::Start(part.range_start)).await?;
    let data = read_chunked(ctx, file, part.len(), chunk_size, progress, part.part_number).await?;
    if data.len() as u64 != part.len() {
        return Err(TransferError::Io(format!(
            "{} ended inside part {}",
            relative_path, part.part_number
        )));
    }
    Ok(data)
}

async fn put_part(
    ctx: &SessionContext,
    url: &str,
    part_number: u32,
    data: Vec<u8>,
) -> Result<PartETag, TransferError> {
    debug!("PUT part {} ({} bytes)", part_number, data.len());

    let request = ctx
        .http()
        .put(url)
        .header(CONTENT_LENGTH, data.len())
        .header(CONTENT_TYPE, "binary/octet-stream")
        .body(data);
    let response = ctx.send(request).await?;
    let response = check_status("upload part", response).await?;

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TransferError::InvalidResponse {
            operation: "upload part",
            message: format!("no ETag for part {}", part_number),
        })?;

    Ok(PartETag { part_number, etag })
}
