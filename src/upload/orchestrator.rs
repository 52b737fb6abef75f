use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::descriptor::{BackendKind, FilePlan, PartETag, TransferId};
use super::strategy::{for_plan, SourceFile};
use super::validation::ValidatedUpload;
use super::TransferOptions;
use crate::client::TransferApi;
use crate::error::TransferError;
use crate::manifest::{FileEntry, TransferManifest};
use crate::progress::{FileProgress, NoProgress, ProgressSink};
use crate::session::SessionContext;

// =============================================================================
// State and outcome
// =============================================================================

/// Where a transfer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Validating,
    AwaitingManifest,
    /// Moving the bytes of the file at this manifest index
    Transferring { index: usize },
    /// Completing and finalizing the file at this manifest index
    Finalizing { index: usize },
    Done,
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Validating => f.write_str("validating"),
            TransferState::AwaitingManifest => f.write_str("awaiting manifest"),
            TransferState::Transferring { index } => write!(f, "transferring file {}", index),
            TransferState::Finalizing { index } => write!(f, "finalizing file {}", index),
            TransferState::Done => f.write_str("done"),
            TransferState::Failed => f.write_str("failed"),
        }
    }
}

/// One file that was uploaded and finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub relative_path: String,
    pub length_bytes: u64,
    /// Part ETags, empty unless uploaded with S3 multipart
    pub parts: Vec<PartETag>,
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub transfer_id: TransferId,
    pub backend: BackendKind,
    pub files: Vec<UploadedFile>,
}

impl TransferReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.length_bytes).sum()
    }
}

/// Terminal result of one top-level transfer call.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Completed(TransferReport),
    Failed {
        error: TransferError,
        /// State the transfer was in when it failed
        state: TransferState,
    },
}

impl TransferOutcome {
    pub(crate) fn failed(error: TransferError, state: TransferState) -> Self {
        TransferOutcome::Failed { error, state }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed(_))
    }

    /// Human-readable reason, present iff the transfer failed.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            TransferOutcome::Completed(_) => None,
            TransferOutcome::Failed { error, .. } => Some(error.to_string()),
        }
    }

    pub fn report(&self) -> Option<&TransferReport> {
        match self {
            TransferOutcome::Completed(report) => Some(report),
            TransferOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TransferError> {
        match self {
            TransferOutcome::Completed(_) => None,
            TransferOutcome::Failed { error, .. } => Some(error),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives one manifest through registration, per-file upload and
/// finalization.
///
/// Files are processed strictly in manifest order and the first failure stops
/// the transfer. Nothing is retried.
pub struct TransferOrchestrator<A> {
    api: A,
    ctx: SessionContext,
    options: TransferOptions,
    progress: Arc<dyn ProgressSink>,
}

impl<A: TransferApi> TransferOrchestrator<A> {
    pub fn new(api: A, ctx: SessionContext) -> Self {
        Self {
            api,
            ctx,
            options: TransferOptions::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Discover the slide's files and transfer them.
    pub async fn upload(&self, request: &ValidatedUpload) -> TransferOutcome {
        debug!("Collecting files of {}", request.slide_path.display());
        let manifest = match TransferManifest::for_slide(&request.slide_path).await {
            Ok(manifest) => manifest,
            Err(e) => return TransferOutcome::failed(e, TransferState::Validating),
        };
        self.transfer(&manifest, &request.upload_directory).await
    }

    /// Transfer every file of `manifest` into `remote_directory`.
    pub async fn transfer(
        &self,
        manifest: &TransferManifest,
        remote_directory: &str,
    ) -> TransferOutcome {
        let mut state = TransferState::AwaitingManifest;
        match self.run(manifest, remote_directory, &mut state).await {
            Ok(report) => {
                info!(
                    "Transfer {} completed: {} files, {} bytes",
                    report.transfer_id,
                    report.files.len(),
                    report.total_bytes()
                );
                TransferOutcome::Completed(report)
            }
            Err(error) => {
                warn!("Transfer failed while {}: {}", state, error);
                TransferOutcome::failed(error, state)
            }
        }
    }

    async fn run(
        &self,
        manifest: &TransferManifest,
        remote_directory: &str,
        state: &mut TransferState,
    ) -> Result<TransferReport, TransferError> {
        self.transition(state, TransferState::AwaitingManifest);
        let descriptor = self
            .api
            .register_manifest(manifest, remote_directory)
            .await?;
        descriptor.check_manifest(manifest)?;

        if descriptor.is_legacy_fallback() {
            warn!(
                "Service returned {:?} storage without upload URLs; uploading through the service",
                descriptor.storage()
            );
        }
        info!(
            "Transfer {} registered: {} files via {}",
            descriptor.id(),
            manifest.len(),
            descriptor.kind()
        );

        let mut files = Vec::with_capacity(manifest.len());
        for (index, entry) in manifest.entries().iter().enumerate() {
            self.transition(state, TransferState::Transferring { index });
            let plan = descriptor.plan_for(index, entry)?;
            let parts = self
                .transfer_file(manifest, entry, &plan, descriptor.id(), state, index)
                .await
                .map_err(|e| e.for_file(&entry.relative_path))?;

            files.push(UploadedFile {
                relative_path: entry.relative_path.clone(),
                length_bytes: entry.length_bytes,
                parts,
            });
        }

        self.transition(state, TransferState::Done);
        Ok(TransferReport {
            transfer_id: descriptor.id().clone(),
            backend: descriptor.kind(),
            files,
        })
    }

    async fn transfer_file(
        &self,
        manifest: &TransferManifest,
        entry: &FileEntry,
        plan: &FilePlan<'_>,
        transfer_id: &TransferId,
        state: &mut TransferState,
        index: usize,
    ) -> Result<Vec<PartETag>, TransferError> {
        if self.ctx.cancellation_token().is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let path = manifest.local_path(entry).ok_or_else(|| {
            TransferError::InvalidManifest("manifest has no local root".to_string())
        })?;
        let source = SourceFile::open(entry.clone(), &path).await?;
        let progress = FileProgress::new(
            Arc::clone(&self.progress),
            entry.relative_path.clone(),
            entry.length_bytes,
        );

        let strategy = for_plan(plan, transfer_id, &self.options);
        debug!(
            "Uploading {} ({} bytes) via {}",
            entry.relative_path,
            entry.length_bytes,
            strategy.kind()
        );
        let parts = strategy.upload(&self.ctx, source, &progress).await?;
        progress.finish();

        self.transition(state, TransferState::Finalizing { index });
        if let FilePlan::Multipart { plan } = plan {
            self.api
                .complete_multipart(&entry.relative_path, &plan.upload_id, &parts)
                .await?;
        }
        let status = self.api.finalize_transfer(transfer_id).await?;
        debug!("Finalized {}: {}", entry.relative_path, status);

        Ok(parts)
    }

    fn transition(&self, state: &mut TransferState, next: TransferState) {
        if *state != next {
            debug!("Transfer state: {} -> {}", state, next);
            *state = next;
        }
    }
}
