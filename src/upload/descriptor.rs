//! Backend descriptors: the server's instructions on how to upload.
//!
//! The registration call answers with a storage type, optional presigned URLs
//! and optional multipart plans. [`BackendDescriptor::from_response`] resolves
//! that into one [`BackendKind`]:
//!
//! | Storage    | Multipart plans | URLs      | Kind                           |
//! |------------|-----------------|-----------|--------------------------------|
//! | FileSystem | any             | any       | `Direct`                       |
//! | AmazonS3   | present         | any       | `S3Multipart`                  |
//! | AmazonS3   | none            | present   | `PresignedSingle`              |
//! | Azure      | any             | present   | `AzureBlockBlob`               |
//! | S3 / Azure | none            | none      | `Direct` (legacy fallback)     |
//!
//! Older service deployments never return URLs; they expect bytes on the
//! session-scoped upload endpoint. That case is flagged with
//! [`BackendDescriptor::is_legacy_fallback`] so it is not mistaken for a
//! malformed descriptor.

use std::fmt;

use crate::client::models::{MultipartFileModel, RawId, RawUploadType, UploadResponse};
use crate::error::TransferError;
use crate::manifest::{FileEntry, TransferManifest};

// =============================================================================
// Identifiers and kinds
// =============================================================================

/// Opaque id of one transfer session on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferId(String);

impl TransferId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RawId> for TransferId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => TransferId(n.to_string()),
            RawId::Text(s) => TransferId(s),
        }
    }
}

/// Storage behind the service's upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    FileSystem,
    AmazonS3,
    Azure,
}

impl StorageKind {
    fn from_raw(raw: &RawUploadType) -> Result<Self, TransferError> {
        match raw {
            RawUploadType::Code(0) => Ok(StorageKind::FileSystem),
            RawUploadType::Code(1) => Ok(StorageKind::AmazonS3),
            RawUploadType::Code(2) => Ok(StorageKind::Azure),
            RawUploadType::Name(name) => match name.to_ascii_lowercase().as_str() {
                "filesystem" | "direct" => Ok(StorageKind::FileSystem),
                "amazons3" | "s3" => Ok(StorageKind::AmazonS3),
                "azure" => Ok(StorageKind::Azure),
                _ => Err(TransferError::InvalidDescriptor(format!(
                    "unknown upload type {:?}",
                    name
                ))),
            },
            RawUploadType::Code(code) => Err(TransferError::InvalidDescriptor(format!(
                "unknown upload type {}",
                code
            ))),
        }
    }
}

/// Wire protocol used to move a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Multipart form POST to the service itself
    Direct,
    /// One PUT per file to a presigned URL
    PresignedSingle,
    /// One PUT per part to presigned part URLs, then a completion call
    S3Multipart,
    /// Staged blocks plus a block list commit
    AzureBlockBlob,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Direct => "direct",
            BackendKind::PresignedSingle => "presigned-single",
            BackendKind::S3Multipart => "s3-multipart",
            BackendKind::AzureBlockBlob => "azure-block-blob",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Multipart plans
// =============================================================================

/// A contiguous byte range of a file with its presigned upload URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based, echoed back verbatim on completion
    pub part_number: u32,
    pub url: String,
    pub range_start: u64,
    /// Inclusive
    pub range_end: u64,
}

impl PartRange {
    /// Number of bytes in this part.
    pub fn len(&self) -> u64 {
        self.range_end
            .saturating_sub(self.range_start)
            .saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Server-assigned part layout for one multipart file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPlan {
    pub file_path: String,
    pub upload_id: String,
    /// Sorted by ascending part number
    pub parts: Vec<PartRange>,
}

impl MultipartPlan {
    pub fn new(file_path: impl Into<String>, upload_id: impl Into<String>, mut parts: Vec<PartRange>) -> Self {
        parts.sort_by_key(|p| p.part_number);
        Self {
            file_path: file_path.into(),
            upload_id: upload_id.into(),
            parts,
        }
    }

    /// Sum of all part lengths.
    pub fn total_bytes(&self) -> u64 {
        self.parts
            .iter()
            .filter(|p| p.range_end >= p.range_start)
            .map(PartRange::len)
            .sum()
    }

    /// Check that the parts tile `0..length` exactly, numbered `1..=n`.
    pub fn validate(&self, length: u64) -> Result<(), TransferError> {
        let invalid = |msg: String| {
            TransferError::InvalidDescriptor(format!("multipart plan for {}: {}", self.file_path, msg))
        };

        if self.parts.is_empty() {
            return Err(invalid("no parts".to_string()));
        }

        let mut expected_start = 0u64;
        for (i, part) in self.parts.iter().enumerate() {
            let expected_number = i as u32 + 1;
            if part.part_number != expected_number {
                return Err(invalid(format!(
                    "expected part number {}, found {}",
                    expected_number, part.part_number
                )));
            }
            if part.range_end < part.range_start {
                return Err(invalid(format!(
                    "part {} has an inverted range {}-{}",
                    part.part_number, part.range_start, part.range_end
                )));
            }
            if part.range_start != expected_start {
                return Err(invalid(format!(
                    "part {} starts at {}, expected {}",
                    part.part_number, part.range_start, expected_start
                )));
            }
            expected_start = part.range_end.checked_add(1).ok_or_else(|| {
                invalid(format!(
                    "part {} ends past the largest file offset",
                    part.part_number
                ))
            })?;
        }

        if expected_start != length {
            return Err(invalid(format!(
                "parts cover {} bytes but the file has {}",
                expected_start, length
            )));
        }

        Ok(())
    }

    /// Whether this plan belongs to the manifest entry with `relative_path`.
    ///
    /// The server may report the path relative to the slide or prefixed with
    /// the target directory, with either separator.
    pub fn matches(&self, relative_path: &str) -> bool {
        let normalized = self.file_path.replace('\\', "/");
        let normalized = normalized.trim_start_matches('/');
        normalized == relative_path || normalized.ends_with(&format!("/{}", relative_path))
    }
}

impl From<MultipartFileModel> for MultipartPlan {
    fn from(model: MultipartFileModel) -> Self {
        let parts = model
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(|p| PartRange {
                part_number: p.part_number,
                url: p.url,
                range_start: p.range_start,
                range_end: p.range_end,
            })
            .collect();
        MultipartPlan::new(model.file_path, model.upload_id, parts)
    }
}

/// Integrity token returned by the storage backend for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartETag {
    pub part_number: u32,
    /// Quotes stripped
    pub etag: String,
}

// =============================================================================
// Descriptor
// =============================================================================

/// How the bytes of one manifest file are to be moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePlan<'a> {
    Direct,
    PresignedSingle { url: &'a str },
    Multipart { plan: &'a MultipartPlan },
    BlockBlob { url: &'a str },
}

impl FilePlan<'_> {
    pub fn kind(&self) -> BackendKind {
        match self {
            FilePlan::Direct => BackendKind::Direct,
            FilePlan::PresignedSingle { .. } => BackendKind::PresignedSingle,
            FilePlan::Multipart { .. } => BackendKind::S3Multipart,
            FilePlan::BlockBlob { .. } => BackendKind::AzureBlockBlob,
        }
    }
}

/// Resolved answer of the manifest registration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    id: TransferId,
    storage: StorageKind,
    kind: BackendKind,
    per_file_urls: Vec<String>,
    multipart_plans: Vec<MultipartPlan>,
    legacy_fallback: bool,
}

impl BackendDescriptor {
    /// Resolve the backend kind from storage type and supplied resources.
    pub fn new(
        id: TransferId,
        storage: StorageKind,
        per_file_urls: Vec<String>,
        multipart_plans: Vec<MultipartPlan>,
    ) -> Self {
        let (kind, legacy_fallback) = match storage {
            StorageKind::FileSystem if !per_file_urls.is_empty() => (BackendKind::PresignedSingle, false),
            StorageKind::FileSystem => (BackendKind::Direct, false),
            StorageKind::AmazonS3 if !multipart_plans.is_empty() => (BackendKind::S3Multipart, false),
            StorageKind::AmazonS3 if !per_file_urls.is_empty() => (BackendKind::PresignedSingle, false),
            StorageKind::Azure if !per_file_urls.is_empty() => (BackendKind::AzureBlockBlob, false),
            StorageKind::AmazonS3 | StorageKind::Azure => (BackendKind::Direct, true),
        };

        Self {
            id,
            storage,
            kind,
            per_file_urls,
            multipart_plans,
            legacy_fallback,
        }
    }

    /// Convert the wire response.
    ///
    /// A missing `UploadType` means S3 when URLs or plans are present and the
    /// file system otherwise.
    pub fn from_response(response: UploadResponse) -> Result<Self, TransferError> {
        let urls = response.urls.unwrap_or_default();
        let plans: Vec<MultipartPlan> = response
            .multipart_files
            .unwrap_or_default()
            .into_iter()
            .map(MultipartPlan::from)
            .collect();

        let storage = match &response.upload_type {
            Some(raw) => StorageKind::from_raw(raw)?,
            None if !urls.is_empty() || !plans.is_empty() => StorageKind::AmazonS3,
            None => StorageKind::FileSystem,
        };

        Ok(Self::new(response.id.into(), storage, urls, plans))
    }

    pub fn id(&self) -> &TransferId {
        &self.id
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// True when a cloud storage type came without any URLs.
    pub fn is_legacy_fallback(&self) -> bool {
        self.legacy_fallback
    }

    pub fn per_file_urls(&self) -> &[String] {
        &self.per_file_urls
    }

    pub fn multipart_plans(&self) -> &[MultipartPlan] {
        &self.multipart_plans
    }

    /// Plan matching a manifest path, if any.
    pub fn multipart_plan(&self, relative_path: &str) -> Option<&MultipartPlan> {
        self.multipart_plans.iter().find(|p| p.matches(relative_path))
    }

    /// Check the descriptor against the manifest before any byte is sent.
    pub fn check_manifest(&self, manifest: &TransferManifest) -> Result<(), TransferError> {
        let url_count_ok = self.per_file_urls.len() == manifest.len();

        match self.kind {
            BackendKind::Direct => Ok(()),
            BackendKind::PresignedSingle | BackendKind::AzureBlockBlob if !url_count_ok => {
                Err(TransferError::InvalidDescriptor(format!(
                    "{} upload URLs for {} files",
                    self.per_file_urls.len(),
                    manifest.len()
                )))
            }
            BackendKind::PresignedSingle | BackendKind::AzureBlockBlob => Ok(()),
            BackendKind::S3Multipart => {
                for plan in &self.multipart_plans {
                    let entry = manifest
                        .entries()
                        .iter()
                        .find(|e| plan.matches(&e.relative_path))
                        .ok_or_else(|| {
                            TransferError::InvalidDescriptor(format!(
                                "multipart plan for unknown file {}",
                                plan.file_path
                            ))
                        })?;
                    plan.validate(entry.length_bytes)?;
                }
                for (index, entry) in manifest.entries().iter().enumerate() {
                    self.plan_for(index, entry)?;
                }
                Ok(())
            }
        }
    }

    /// Resources for the file at `index` of the manifest.
    pub fn plan_for<'a>(&'a self, index: usize, entry: &FileEntry) -> Result<FilePlan<'a>, TransferError> {
        let url = || {
            self.per_file_urls
                .get(index)
                .map(String::as_str)
                .ok_or_else(|| {
                    TransferError::InvalidDescriptor(format!(
                        "no upload URL for {}",
                        entry.relative_path
                    ))
                })
        };

        match self.kind {
            BackendKind::Direct => Ok(FilePlan::Direct),
            BackendKind::PresignedSingle => Ok(FilePlan::PresignedSingle { url: url()? }),
            BackendKind::AzureBlockBlob => Ok(FilePlan::BlockBlob { url: url()? }),
            BackendKind::S3Multipart => match self.multipart_plan(&entry.relative_path) {
                Some(plan) => Ok(FilePlan::Multipart { plan }),
                // Small files may get a single presigned URL instead of a plan.
                None => Ok(FilePlan::PresignedSingle { url: url()? }),
            },
        }
    }
}
