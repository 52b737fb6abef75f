use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::TransferError;
use crate::manifest::TransferManifest;
use crate::upload::{BackendDescriptor, PartETag, TransferId};

/// Whatever the service returns when a transfer is finalized.
pub type UploadStatus = serde_json::Value;

/// One file of a remote slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Server-side path of the file, `/`-separated
    pub path: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

/// Body of a file download with its announced length.
pub struct RemoteStream {
    pub content_length: u64,
    pub body: BoxStream<'static, Result<Bytes, TransferError>>,
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Operations of the slide management service used by transfers.
///
/// Storage backend calls (presigned PUTs, Azure blocks) are not part of this
/// trait; they go straight to the URLs handed out in the
/// [`BackendDescriptor`].
#[async_trait]
pub trait TransferApi: Send + Sync {
    /// Register the manifest under `remote_directory` and get the backend
    /// descriptor for it.
    async fn register_manifest(
        &self,
        manifest: &TransferManifest,
        remote_directory: &str,
    ) -> Result<BackendDescriptor, TransferError>;

    /// Tell the service that every part of a multipart file is stored.
    async fn complete_multipart(
        &self,
        file_path: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> Result<(), TransferError>;

    /// Finalize one uploaded file of the transfer.
    async fn finalize_transfer(&self, id: &TransferId) -> Result<UploadStatus, TransferError>;

    /// List every file belonging to a remote slide.
    async fn list_files_for_slide(&self, slide_ref: &str) -> Result<Vec<RemoteFile>, TransferError>;

    /// Open a download stream for one file of a remote slide.
    async fn download_file(
        &self,
        slide_ref: &str,
        relative_path: &str,
    ) -> Result<RemoteStream, TransferError>;
}
