use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::api::{RemoteFile, RemoteStream, TransferApi, UploadStatus};
use super::check_status;
use super::models::{
    CompleteMultipartModel, FileListResponse, PartETagModel, UploadHeader, UploadResponse,
};
use crate::error::TransferError;
use crate::manifest::TransferManifest;
use crate::session::SessionContext;
use crate::upload::{BackendDescriptor, PartETag, TransferId};

/// HTTP implementation of [`TransferApi`].
#[derive(Debug, Clone)]
pub struct CoreClient {
    ctx: SessionContext,
}

impl CoreClient {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Service URL with `sessionId` (spelled `key`) and extra query pairs.
    fn url(&self, path: &str, key: &str, extra: &[(&str, &str)]) -> Result<Url, TransferError> {
        let mut url = self.ctx.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(key, self.ctx.session_id());
            for (name, value) in extra {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Read a JSON body under cancellation.
    async fn json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T, TransferError> {
        let body = self
            .ctx
            .run(async move { response.text().await.map_err(TransferError::from) })
            .await?;
        serde_json::from_str(&body).map_err(|e| TransferError::InvalidResponse {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TransferApi for CoreClient {
    async fn register_manifest(
        &self,
        manifest: &TransferManifest,
        remote_directory: &str,
    ) -> Result<BackendDescriptor, TransferError> {
        const OPERATION: &str = "register manifest";

        let url = self.url("transfer/Upload", "sessionId", &[])?;
        let header = UploadHeader {
            path: remote_directory,
            files: manifest.entries(),
        };
        debug!(
            "Registering {} files ({} bytes) under {}",
            manifest.len(),
            manifest.total_bytes(),
            remote_directory
        );

        let response = self.ctx.send(self.ctx.http().post(url).json(&header)).await?;
        let response = check_status(OPERATION, response).await?;
        let body: UploadResponse = self.json(OPERATION, response).await?;

        BackendDescriptor::from_response(body)
    }

    async fn complete_multipart(
        &self,
        file_path: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> Result<(), TransferError> {
        let url = self.url("transfer/Upload/CompleteMultipart", "sessionId", &[])?;
        let body = CompleteMultipartModel {
            file_path,
            upload_id,
            parts: parts
                .iter()
                .map(|p| PartETagModel {
                    part_number: p.part_number,
                    etag: &p.etag,
                })
                .collect(),
        };

        let response = self.ctx.send(self.ctx.http().post(url).json(&body)).await?;
        check_status("complete multipart upload", response).await?;
        Ok(())
    }

    async fn finalize_transfer(&self, id: &TransferId) -> Result<UploadStatus, TransferError> {
        const OPERATION: &str = "finalize transfer";

        let url = self.url(&format!("transfer/Upload/{}", id), "sessionId", &[])?;
        let response = self.ctx.send(self.ctx.http().get(url)).await?;
        let response = check_status(OPERATION, response).await?;

        let body = self
            .ctx
            .run(async move { response.text().await.map_err(TransferError::from) })
            .await?;
        if body.trim().is_empty() {
            return Ok(UploadStatus::Null);
        }
        serde_json::from_str(&body).map_err(|e| TransferError::InvalidResponse {
            operation: OPERATION,
            message: e.to_string(),
        })
    }

    async fn list_files_for_slide(&self, slide_ref: &str) -> Result<Vec<RemoteFile>, TransferError> {
        const OPERATION: &str = "list slide files";

        let slide_ref = slide_ref.trim_start_matches('/');
        let url = self.url(
            "api/json/getfilenames",
            "sessionID",
            &[("pathOrUid", slide_ref)],
        )?;
        let response = self.ctx.send(self.ctx.http().get(url)).await?;
        let status = response.status().as_u16();
        let response = check_status(OPERATION, response).await?;

        let files = match self.json::<FileListResponse>(OPERATION, response).await? {
            FileListResponse::Bare(files) | FileListResponse::Wrapped { d: files } => files,
            FileListResponse::Error(error) => {
                let status = error
                    .code
                    .as_ref()
                    .and_then(|c| match c {
                        serde_json::Value::Number(n) => n.as_u64(),
                        serde_json::Value::String(s) => s.parse().ok(),
                        _ => None,
                    })
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or(status);
                return Err(TransferError::Protocol {
                    operation: OPERATION,
                    status,
                    message: error
                        .reason()
                        .unwrap_or_else(|| format!("no files for {}", slide_ref)),
                });
            }
        };

        Ok(files
            .into_iter()
            .map(|f| RemoteFile {
                path: f.path,
                size: f.size,
                last_modified: f.last_modified,
            })
            .collect())
    }

    async fn download_file(
        &self,
        slide_ref: &str,
        relative_path: &str,
    ) -> Result<RemoteStream, TransferError> {
        const OPERATION: &str = "download file";

        let url = self.url(
            "transfer/Download/",
            "sessionId",
            &[("image", slide_ref), ("path", relative_path)],
        )?;
        let response = self.ctx.send(self.ctx.http().get(url)).await?;
        let response = check_status(OPERATION, response).await?;

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| TransferError::InvalidResponse {
                operation: OPERATION,
                message: format!("no Content-Length for {}", relative_path),
            })?;

        let cancel = self.ctx.cancellation_token().clone();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();

        // Each chunk read races the session's cancellation token.
        let body = stream::unfold(Some((chunks, cancel)), |state| async move {
            let (mut chunks, cancel) = state?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Some((Err(TransferError::Cancelled), None)),
                next = chunks.next() => next.map(|item| (item, Some((chunks, cancel)))),
            }
        })
        .boxed();

        Ok(RemoteStream {
            content_length,
            body,
        })
    }
}
