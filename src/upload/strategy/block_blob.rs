use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderName, CONTENT_TYPE};
use tracing::debug;

use super::{read_chunked, with_query, SourceFile, UploadStrategy};
use crate::client::check_status;
use crate::error::TransferError;
use crate::progress::FileProgress;
use crate::session::SessionContext;
use crate::upload::descriptor::{BackendKind, PartETag};

const BLOB_CONTENT_TYPE: HeaderName = HeaderName::from_static("x-ms-blob-content-type");

/// Block id of the block at `index`: base64 of `block_NNNNNN`.
pub fn block_id(index: usize) -> String {
    STANDARD.encode(format!("block_{:06}", index))
}

/// Azure-style block blob upload.
///
/// The file is staged as fixed-size blocks in order, then committed with one
/// block list listing the ids in upload order.
#[derive(Debug, Clone)]
pub struct BlockBlobUpload {
    url: String,
    block_size: usize,
}

impl BlockBlobUpload {
    pub fn new(url: impl Into<String>, block_size: usize) -> Self {
        Self {
            url: url.into().replace(' ', "%20"),
            block_size: block_size.max(1),
        }
    }

    fn block_url(&self, id: &str) -> String {
        with_query(
            &self.url,
            &format!("comp=block&blockid={}", urlencoding::encode(id)),
        )
    }

    fn commit_url(&self) -> String {
        with_query(&self.url, "comp=blocklist")
    }
}

/// Block list commit body.
fn block_list_xml(ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

#[async_trait]
impl UploadStrategy for BlockBlobUpload {
    fn kind(&self) -> BackendKind {
        BackendKind::AzureBlockBlob
    }

    async fn upload(
        &self,
        ctx: &SessionContext,
        source: SourceFile,
        progress: &FileProgress,
    ) -> Result<Vec<PartETag>, TransferError> {
        let SourceFile { mut file, .. } = source;
        let mut ids = Vec::new();

        loop {
            let index = ids.len();
            let data = read_chunked(
                ctx,
                &mut file,
                self.block_size as u64,
                self.block_size,
                progress,
                index as u32 + 1,
            )
            .await?;
            if data.is_empty() {
                break;
            }

            let id = block_id(index);
            debug!("PUT block {} ({} bytes)", index, data.len());
            let response = ctx
                .send(ctx.http().put(self.block_url(&id)).body(data))
                .await?;
            check_status("stage block", response).await?;
            ids.push(id);
        }

        let request = ctx
            .http()
            .put(self.commit_url())
            .header(CONTENT_TYPE, "application/xml")
            .header(BLOB_CONTENT_TYPE, "application/octet-stream")
            .body(block_list_xml(&ids));
        let response = ctx.send(request).await?;
        check_status("commit block list", response).await?;

        Ok(Vec::new())
    }
}
