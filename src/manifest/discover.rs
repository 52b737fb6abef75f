//! Local slide file discovery.
//!
//! Single-file formats (SVS, TIFF, NDPI, ...) are just the main file. Multi-file
//! formats keep their data in a companion directory next to the main file:
//!
//! - MRXS: `slide.mrxs` + `slide/`
//! - VSI:  `slide.vsi` + `_slide_/`
//!
//! Every regular file found recursively under a companion directory belongs to
//! the slide.

use std::path::{Component, Path, PathBuf};

use crate::error::TransferError;

/// Enumerate the local files of the slide whose main file is `main`.
///
/// The main file is returned last; companion files are sorted by path.
pub async fn discover_slide_files(main: &Path) -> Result<Vec<PathBuf>, TransferError> {
    let stem = main
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            TransferError::InvalidManifest(format!("{} has no file name", main.display()))
        })?;
    let parent = main.parent().unwrap_or_else(|| Path::new(""));

    let mut files = Vec::new();
    if let Some(companion) = companion_directory(main, parent, stem) {
        let is_dir = match tokio::fs::metadata(&companion).await {
            Ok(meta) => meta.is_dir(),
            Err(_) => false,
        };
        if is_dir {
            collect_files(&companion, &mut files).await?;
        }
    }

    files.sort();
    files.push(main.to_path_buf());
    Ok(files)
}

/// Companion directory of a multi-file format, `None` for single-file formats.
fn companion_directory(main: &Path, parent: &Path, stem: &str) -> Option<PathBuf> {
    let extension = main.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "mrxs" => Some(parent.join(stem)),
        "vsi" => Some(parent.join(format!("_{}_", stem))),
        _ => None,
    }
}

/// Recursively collect regular files below `dir`.
async fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TransferError> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut reader = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                out.push(entry.path());
            }
        }
    }

    Ok(())
}

/// Deepest directory containing every file in `files`.
///
/// Returns `None` for an empty list or files on different roots (e.g. two
/// Windows drives).
pub fn common_root(files: &[PathBuf]) -> Option<PathBuf> {
    let mut parents = files.iter().map(|f| f.parent().unwrap_or_else(|| Path::new("")));
    let first = parents.next()?;
    let mut common: Vec<Component<'_>> = first.components().collect();

    for parent in parents {
        let shared = common
            .iter()
            .zip(parent.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }

    if first.has_root() && !common.iter().any(|c| matches!(c, Component::RootDir)) {
        return None;
    }

    Some(common.iter().collect())
}

/// `path` relative to `root`, joined with `/` regardless of platform.
pub fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
