//! Slide downloads.
//!
//! The [`DownloadEngine`] asks the service for every file of a remote slide and
//! streams each one to disk below a local directory, keeping the layout
//! relative to the slide's directory on the server:
//!
//! ```text
//! slide_ref  = Reference/3DHistech/CMU-1.mrxs
//! server     = Reference/3DHistech/CMU-1/Data0000.dat
//! local      = <save_directory>/CMU-1/Data0000.dat
//! ```
//!
//! Existing files are overwritten. A failed download leaves whatever was
//! already written in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::client::TransferApi;
use crate::error::{TransferError, ValidationError};
use crate::manifest::is_contained;
use crate::progress::{FileProgress, NoProgress, ProgressSink, DEFAULT_REPORT_STEP};

/// Write granularity for downloads.
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 10 * 1024;

/// Tuning knobs for downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    pub chunk_size: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_DOWNLOAD_CHUNK_SIZE,
        }
    }
}

/// One file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Path relative to the slide's directory, `/`-separated
    pub relative_path: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

/// Summary of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub slide_ref: String,
    pub files: Vec<DownloadedFile>,
}

impl DownloadReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

/// Downloads every file of a remote slide.
pub struct DownloadEngine<A> {
    api: A,
    options: DownloadOptions,
    progress: Arc<dyn ProgressSink>,
}

impl<A: TransferApi> DownloadEngine<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            options: DownloadOptions::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Progress is forwarded per file in steps of at least 5%, plus the
    /// completing event.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Download the slide at `slide_ref` into `local_dir`.
    ///
    /// Stops at the first failing file.
    pub async fn download(
        &self,
        slide_ref: &str,
        local_dir: &Path,
    ) -> Result<DownloadReport, TransferError> {
        validate(slide_ref, local_dir).await?;

        let files = self.api.list_files_for_slide(slide_ref).await?;
        if files.is_empty() {
            return Err(TransferError::NotFound(slide_ref.to_string()));
        }

        let main_directory = main_directory(slide_ref);
        info!(
            "Downloading {} files of {} into {}",
            files.len(),
            slide_ref,
            local_dir.display()
        );

        let mut downloaded = Vec::with_capacity(files.len());
        for remote in &files {
            let relative = relative_path(&remote.path, main_directory)?;
            let local_path = relative
                .split('/')
                .fold(local_dir.to_path_buf(), |path, segment| path.join(segment));

            let bytes = self
                .download_file(slide_ref, &relative, &local_path)
                .await
                .map_err(|e| e.for_file(&relative))?;

            downloaded.push(DownloadedFile {
                relative_path: relative,
                local_path,
                bytes,
            });
        }

        Ok(DownloadReport {
            slide_ref: slide_ref.to_string(),
            files: downloaded,
        })
    }

    async fn download_file(
        &self,
        slide_ref: &str,
        relative: &str,
        local_path: &Path,
    ) -> Result<u64, TransferError> {
        debug!("Downloading {} of {}", relative, slide_ref);
        let mut stream = self.api.download_file(slide_ref, relative).await?;
        let total = stream.content_length;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local_path).await?;

        let progress = FileProgress::throttled(
            Arc::clone(&self.progress),
            relative,
            total,
            DEFAULT_REPORT_STEP,
        );
        let chunk_size = self.options.chunk_size.max(1);
        let mut written = 0u64;

        while let Some(chunk) = stream.body.next().await {
            let chunk = chunk?;
            if written + chunk.len() as u64 > total {
                return Err(TransferError::InvalidResponse {
                    operation: "download file",
                    message: format!("body exceeds Content-Length of {} bytes", total),
                });
            }
            for piece in chunk.chunks(chunk_size) {
                file.write_all(piece).await?;
                written += piece.len() as u64;
                progress.advance(piece.len() as u64, 0);
            }
        }
        file.flush().await?;

        if written != total {
            return Err(TransferError::InvalidResponse {
                operation: "download file",
                message: format!("received {} of {} bytes", written, total),
            });
        }
        progress.finish();

        Ok(written)
    }
}

async fn validate(slide_ref: &str, local_dir: &Path) -> Result<(), ValidationError> {
    if slide_ref.trim().is_empty() {
        return Err(ValidationError::Empty { field: "slide_ref" });
    }

    let metadata = tokio::fs::metadata(local_dir)
        .await
        .map_err(|_| ValidationError::PathNotFound {
            field: "save_directory",
            path: local_dir.to_path_buf(),
        })?;
    if !metadata.is_dir() {
        return Err(ValidationError::NotADirectory {
            field: "save_directory",
            path: local_dir.to_path_buf(),
        });
    }

    Ok(())
}

/// Server directory of the slide: everything before the last `/`.
fn main_directory(slide_ref: &str) -> &str {
    let slide_ref = slide_ref.trim_start_matches('/');
    slide_ref.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Server path relative to the slide's directory.
fn relative_path(server_path: &str, main_directory: &str) -> Result<String, TransferError> {
    let path = server_path.trim_start_matches('/');
    let stripped = match path.strip_prefix(main_directory) {
        Some(rest) if main_directory.is_empty() || rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => path,
    };
    let relative = stripped.trim_matches(|c: char| c == '/' || c == '\\').replace('\\', "/");

    if relative.is_empty() || !is_contained(&relative) {
        return Err(TransferError::InvalidResponse {
            operation: "list slide files",
            message: format!("unsafe file path {}", server_path),
        });
    }
    Ok(relative)
}
