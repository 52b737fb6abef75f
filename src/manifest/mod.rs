//! Transfer manifests.
//!
//! A [`TransferManifest`] describes every file of one slide as a single
//! logical transfer unit. Multi-file formats (MRXS, VSI, ...) keep their data
//! next to the main file, so paths are stored relative to the deepest
//! directory shared by all source files:
//!
//! ```text
//! /scans/2024/CMU-1.mrxs              ->  CMU-1.mrxs            (main)
//! /scans/2024/CMU-1/Data0000.dat      ->  CMU-1/Data0000.dat
//! /scans/2024/CMU-1/Slidedat.ini      ->  CMU-1/Slidedat.ini
//! ```
//!
//! Manifests are immutable once built.

mod discover;

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::TransferError;

pub use discover::{common_root, discover_slide_files, relative_slash_path};

/// One file of a slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileEntry {
    /// Path relative to the manifest root, `/`-separated
    #[serde(rename = "Path")]
    pub relative_path: String,

    /// File size in bytes
    #[serde(rename = "Length")]
    pub length_bytes: u64,

    /// Whether this is the file that identifies the slide
    pub is_main: bool,
}

impl FileEntry {
    pub fn new(relative_path: impl Into<String>, length_bytes: u64, is_main: bool) -> Self {
        Self {
            relative_path: relative_path.into(),
            length_bytes,
            is_main,
        }
    }

    /// Last path segment, used as the upload file name.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// Ordered, validated list of the files of one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferManifest {
    entries: Vec<FileEntry>,
    root: Option<PathBuf>,
}

impl TransferManifest {
    /// Build a manifest from entries, checking its invariants.
    ///
    /// `root` is the local directory the relative paths resolve against; it is
    /// only needed for uploads.
    pub fn new(entries: Vec<FileEntry>, root: Option<PathBuf>) -> Result<Self, TransferError> {
        if entries.is_empty() {
            return Err(TransferError::InvalidManifest(
                "manifest has no files".to_string(),
            ));
        }

        let main_count = entries.iter().filter(|e| e.is_main).count();
        if main_count != 1 {
            return Err(TransferError::InvalidManifest(format!(
                "expected exactly one main file, found {}",
                main_count
            )));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if entry.relative_path.is_empty() {
                return Err(TransferError::InvalidManifest(
                    "file with empty relative path".to_string(),
                ));
            }
            if !is_contained(&entry.relative_path) {
                return Err(TransferError::InvalidManifest(format!(
                    "path escapes the slide root: {}",
                    entry.relative_path
                )));
            }
            if !seen.insert(entry.relative_path.as_str()) {
                return Err(TransferError::InvalidManifest(format!(
                    "duplicate path: {}",
                    entry.relative_path
                )));
            }
        }

        Ok(Self { entries, root })
    }

    /// Build an upload manifest from local files.
    ///
    /// Sizes are read from the file system. Empty companion files are skipped;
    /// the main file is always kept and placed last.
    pub async fn from_local_files(files: &[PathBuf], main: &Path) -> Result<Self, TransferError> {
        let root = common_root(files).ok_or_else(|| {
            TransferError::InvalidManifest("files share no common directory".to_string())
        })?;

        let mut entries = Vec::with_capacity(files.len());
        let mut main_entry = None;

        for path in files {
            let length = tokio::fs::metadata(path).await?.len();
            let relative = relative_slash_path(path, &root).ok_or_else(|| {
                TransferError::InvalidManifest(format!(
                    "{} is outside {}",
                    path.display(),
                    root.display()
                ))
            })?;

            if path == main {
                main_entry = Some(FileEntry::new(relative, length, true));
            } else if length > 0 {
                entries.push(FileEntry::new(relative, length, false));
            }
        }

        let main_entry = main_entry.ok_or_else(|| {
            TransferError::InvalidManifest(format!(
                "main file {} is not part of the file list",
                main.display()
            ))
        })?;
        entries.push(main_entry);

        Self::new(entries, Some(root))
    }

    /// Discover the files of the slide at `main` and build its manifest.
    pub async fn for_slide(main: &Path) -> Result<Self, TransferError> {
        let files = discover_slide_files(main).await?;
        Self::from_local_files(&files, main).await
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn main_file(&self) -> &FileEntry {
        // `new` guarantees exactly one main entry.
        self.entries
            .iter()
            .find(|e| e.is_main)
            .unwrap_or(&self.entries[0])
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Sum of all file lengths.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.length_bytes).sum()
    }

    /// Absolute local path of an entry, if the manifest has a root.
    pub fn local_path(&self, entry: &FileEntry) -> Option<PathBuf> {
        self.root.as_ref().map(|root| {
            entry
                .relative_path
                .split('/')
                .fold(root.clone(), |path, segment| path.join(segment))
        })
    }
}

/// True when a `/`-separated relative path stays inside its root.
pub(crate) fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
