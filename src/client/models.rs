//! JSON wire models of the slide management service.
//!
//! These mirror the service's PascalCase payloads one to one. Domain code works
//! with the types in [`crate::upload`] instead; conversion happens in
//! [`BackendDescriptor::from_response`](crate::upload::BackendDescriptor::from_response).

use serde::{Deserialize, Serialize};

use crate::manifest::FileEntry;

/// Body of the manifest registration call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadHeader<'a> {
    /// Target virtual directory on the server
    pub path: &'a str,
    pub files: &'a [FileEntry],
}

/// Transfer id as sent by the server (number on most deployments).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

/// Storage backend as sent by the server: enum name or numeric code.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawUploadType {
    Code(i64),
    Name(String),
}

/// Answer to the manifest registration call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadResponse {
    pub id: RawId,

    #[serde(default)]
    pub upload_type: Option<RawUploadType>,

    /// One presigned URL per manifest file, in manifest order
    #[serde(default)]
    pub urls: Option<Vec<String>>,

    #[serde(default)]
    pub multipart_files: Option<Vec<MultipartFileModel>>,
}

/// Multipart plan for one file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MultipartFileModel {
    pub file_path: String,
    pub upload_id: String,

    #[serde(default)]
    pub parts: Option<Vec<MultipartPartModel>>,
}

/// One presigned part of a multipart plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MultipartPartModel {
    pub part_number: u32,
    pub url: String,
    pub range_start: u64,
    pub range_end: u64,
}

/// Body of the multipart completion call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompleteMultipartModel<'a> {
    pub file_path: &'a str,
    pub upload_id: &'a str,
    pub parts: Vec<PartETagModel<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartETagModel<'a> {
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: &'a str,
}

/// One file of a remote slide.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteFileModel {
    pub path: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub last_modified: Option<String>,
}

/// The file list comes bare, wrapped in a `d` envelope, or as an error object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileListResponse {
    Bare(Vec<RemoteFileModel>),
    Wrapped { d: Vec<RemoteFileModel> },
    Error(ApiErrorBody),
}

/// Error body returned by the service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<serde_json::Value>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub exception_message: Option<String>,
}

impl ApiErrorBody {
    /// Human-readable message, combining `Message` and `ExceptionMessage`.
    pub fn reason(&self) -> Option<String> {
        match (self.message.as_deref(), self.exception_message.as_deref()) {
            (Some(m), Some(e)) if !e.is_empty() => Some(format!("{} {}", m, e)),
            (Some(m), _) => Some(m.to_string()),
            (None, Some(e)) => Some(e.to_string()),
            (None, None) => None,
        }
    }
}

/// Best-effort error message from a response body.
pub fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(reason) = parsed.reason() {
            return reason;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.to_string()
    }
}
