//! Input validation for uploads.
//!
//! Checks run in field order and stop at the first violation, so the caller
//! always sees the earliest offending field. No network call is made here.

use std::path::PathBuf;

use url::Url;

use crate::error::ValidationError;
use crate::session::normalize_server_url;

/// Caller input for one slide upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub server_url: Option<String>,
    pub session_id: Option<String>,
    /// Main file of the slide
    pub slide_path: PathBuf,
    /// Target virtual directory on the server
    pub upload_directory: Option<String>,
}

/// Upload input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub server_url: Url,
    pub session_id: String,
    pub slide_path: PathBuf,
    /// Leading `/` removed
    pub upload_directory: String,
}

impl UploadRequest {
    pub fn new(
        server_url: impl Into<String>,
        session_id: impl Into<String>,
        slide_path: impl Into<PathBuf>,
        upload_directory: impl Into<String>,
    ) -> Self {
        Self {
            server_url: Some(server_url.into()),
            session_id: Some(session_id.into()),
            slide_path: slide_path.into(),
            upload_directory: Some(upload_directory.into()),
        }
    }

    /// Validate every field, failing on the first violation.
    pub async fn validate(&self) -> Result<ValidatedUpload, ValidationError> {
        let server_url = match self.server_url.as_deref() {
            None => return Err(ValidationError::Missing { field: "server_url" }),
            Some(raw) => normalize_server_url(raw)?,
        };

        let session_id = required("session_id", self.session_id.as_deref())?;

        if self.slide_path.as_os_str().is_empty() {
            return Err(ValidationError::Empty { field: "slide_path" });
        }
        let metadata = tokio::fs::metadata(&self.slide_path).await.map_err(|_| {
            ValidationError::PathNotFound {
                field: "slide_path",
                path: self.slide_path.clone(),
            }
        })?;
        if !metadata.is_file() {
            return Err(ValidationError::NotAFile {
                field: "slide_path",
                path: self.slide_path.clone(),
            });
        }

        let upload_directory = required("upload_directory", self.upload_directory.as_deref())?;
        let upload_directory = upload_directory.strip_prefix('/').unwrap_or(upload_directory);
        if upload_directory.is_empty() {
            return Err(ValidationError::Empty {
                field: "upload_directory",
            });
        }

        Ok(ValidatedUpload {
            server_url,
            session_id: session_id.to_string(),
            slide_path: self.slide_path.clone(),
            upload_directory: upload_directory.to_string(),
        })
    }
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        None => Err(ValidationError::Missing { field }),
        Some(v) if v.trim().is_empty() => Err(ValidationError::Empty { field }),
        Some(v) => Ok(v),
    }
}
