//! Progress reporting.
//!
//! Strategies and the download engine report raw byte counts to a
//! [`FileProgress`], which turns them into [`ProgressEvent`]s and hands them to
//! the caller's [`ProgressSink`]. Per file, `bytes_sent` never decreases, never
//! exceeds `total_bytes`, and the last event always has
//! `bytes_sent == total_bytes`.
//!
//! Any `Fn(&ProgressEvent) + Send + Sync` closure is a sink; [`ConsoleProgress`]
//! prints percentages in 5% steps and [`NoProgress`] discards everything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Minimum fraction change between two console/download reports.
pub const DEFAULT_REPORT_STEP: f64 = 0.05;

/// One unit of feedback about bytes moved for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Bytes transferred so far for this file
    pub bytes_sent: u64,

    /// Total bytes of this file
    pub total_bytes: u64,

    /// `bytes_sent / total_bytes` as a percentage (100 for empty files)
    pub percent: f64,

    /// Relative path of the file
    pub file_path: String,

    /// Multipart part number, 0 when not applicable
    pub part_number: u32,
}

impl ProgressEvent {
    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.total_bytes
    }

    pub fn fraction(&self) -> f64 {
        self.percent / 100.0
    }
}

/// Receiver of progress events.
///
/// Called on the transfer's own control flow, in byte order per file.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Sink that prints a percentage line per file every 5%.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    thresholds: Mutex<HashMap<String, ProgressThreshold>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let report = match self.thresholds.lock() {
            Ok(mut thresholds) if event.is_complete() => {
                thresholds.remove(&event.file_path);
                true
            }
            Ok(mut thresholds) => thresholds
                .entry(event.file_path.clone())
                .or_insert_with(|| ProgressThreshold::new(DEFAULT_REPORT_STEP))
                .should_report(event.fraction(), false),
            Err(_) => event.is_complete(),
        };

        if report {
            println!("{}: {:.0}%", event.file_path, event.percent);
        }
    }
}

// =============================================================================
// Threshold
// =============================================================================

/// Decides whether a new fraction is worth reporting.
///
/// Reports the first value, every value more than `step` above the last
/// reported one, and the completing value.
#[derive(Debug, Clone)]
pub struct ProgressThreshold {
    last: Option<f64>,
    step: f64,
}

impl ProgressThreshold {
    pub fn new(step: f64) -> Self {
        Self { last: None, step }
    }

    pub fn should_report(&mut self, fraction: f64, complete: bool) -> bool {
        let report = match self.last {
            None => true,
            Some(last) => fraction - last > self.step || (complete && fraction > last),
        };
        if report {
            self.last = Some(fraction);
        }
        report
    }
}

// =============================================================================
// Per-file accumulator
// =============================================================================

/// Byte accumulator for one file.
///
/// Cheap to clone; clones share the same counter so a streaming request body
/// and the orchestrator can both report against it.
#[derive(Clone)]
pub struct FileProgress {
    inner: Arc<FileProgressInner>,
}

struct FileProgressInner {
    sink: Arc<dyn ProgressSink>,
    file_path: String,
    total_bytes: u64,
    sent: AtomicU64,
    finished: AtomicBool,
    threshold: Option<Mutex<ProgressThreshold>>,
}

impl FileProgress {
    pub fn new(sink: Arc<dyn ProgressSink>, file_path: impl Into<String>, total_bytes: u64) -> Self {
        Self::build(sink, file_path.into(), total_bytes, None)
    }

    /// Like [`FileProgress::new`], but only forwards events that moved more
    /// than `step` since the last forwarded one (plus the final event).
    pub fn throttled(
        sink: Arc<dyn ProgressSink>,
        file_path: impl Into<String>,
        total_bytes: u64,
        step: f64,
    ) -> Self {
        Self::build(
            sink,
            file_path.into(),
            total_bytes,
            Some(Mutex::new(ProgressThreshold::new(step))),
        )
    }

    fn build(
        sink: Arc<dyn ProgressSink>,
        file_path: String,
        total_bytes: u64,
        threshold: Option<Mutex<ProgressThreshold>>,
    ) -> Self {
        Self {
            inner: Arc::new(FileProgressInner {
                sink,
                file_path,
                total_bytes,
                sent: AtomicU64::new(0),
                finished: AtomicBool::new(false),
                threshold,
            }),
        }
    }

    pub fn file_path(&self) -> &str {
        &self.inner.file_path
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.total_bytes
    }

    pub fn bytes_sent(&self) -> u64 {
        self.inner.sent.load(Ordering::SeqCst)
    }

    /// Record `bytes` more bytes read for `part_number` (0 if none).
    ///
    /// The counter saturates at `total_bytes`; once the total is reached no
    /// further events are emitted.
    pub fn advance(&self, bytes: u64, part_number: u32) {
        let total = self.inner.total_bytes;
        let previous = self
            .inner
            .sent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |sent| {
                Some(sent.saturating_add(bytes).min(total))
            })
            .unwrap_or_else(|sent| sent);
        let now = previous.saturating_add(bytes).min(total);

        if now == total && self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(now, part_number);
    }

    /// Emit the final `total/total` event if it has not been emitted yet.
    pub fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.sent.store(self.inner.total_bytes, Ordering::SeqCst);
        self.emit(self.inner.total_bytes, 0);
    }

    fn emit(&self, bytes_sent: u64, part_number: u32) {
        let total = self.inner.total_bytes;
        let percent = if total == 0 {
            100.0
        } else {
            bytes_sent as f64 * 100.0 / total as f64
        };

        if let Some(threshold) = &self.inner.threshold {
            let report = match threshold.lock() {
                Ok(mut t) => t.should_report(percent / 100.0, bytes_sent == total),
                Err(_) => bytes_sent == total,
            };
            if !report {
                return;
            }
        }

        self.inner.sink.on_progress(&ProgressEvent {
            bytes_sent,
            total_bytes: total,
            percent,
            file_path: self.inner.file_path.clone(),
            part_number,
        });
    }
}

impl std::fmt::Debug for FileProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProgress")
            .field("file_path", &self.inner.file_path)
            .field("total_bytes", &self.inner.total_bytes)
            .field("bytes_sent", &self.bytes_sent())
            .finish()
    }
}
