//! Progress events sent from the blocking pipeline to whoever is printing.
//!
//! Events go through a bounded `tokio::sync::mpsc` channel. Progress ticks
//! use `try_send` and are dropped when the consumer lags; everything else
//! (found candidates, per-file results) waits for room, so the printed report
//! never misses a line. Senders run on blocking threads, never inside an
//! async task.

use crate::probe::Verdict;
use crate::target::CandidateId;

/// Snapshot of the probe phase, emitted every `progress_every` completions
/// and once at the end.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub completed: usize,
    pub total: usize,
    pub found: usize,
    /// Workers currently allowed to pull candidates.
    pub active_workers: usize,
}

impl ScanProgress {
    /// Whole percent complete in [0, 100].
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        (self.completed * 100 / self.total).min(100)
    }
}

/// Streamed bytes for one file.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub id: CandidateId,
    pub attempt: u32,
    pub bytes_done: u64,
    /// Advertised Content-Length, if any.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Whole percent complete, if the size is known.
    pub fn percent(&self) -> Option<u64> {
        match self.total_bytes {
            Some(0) | None => None,
            Some(total) => Some((self.bytes_done * 100 / total).min(100)),
        }
    }
}

/// Everything the pipeline reports while it runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ScanStarted { total: usize, workers: usize },
    Scan(ScanProgress),
    Found(Verdict),
    ScanFinished { scanned: usize, found: usize, elapsed_secs: f64 },
    AlreadyPresent { id: CandidateId, size: u64 },
    DownloadStarted { id: CandidateId, index: usize, count: usize },
    Download(DownloadProgress),
    Downloaded { id: CandidateId, bytes: u64 },
    DownloadFailed { id: CandidateId, error: String },
}

impl PipelineEvent {
    /// Periodic progress that a newer event supersedes.
    pub fn is_tick(&self) -> bool {
        matches!(self, PipelineEvent::Scan(_) | PipelineEvent::Download(_))
    }
}

/// Optional event sink shared by the schedulers.
pub type EventSender = tokio::sync::mpsc::Sender<PipelineEvent>;

pub(crate) fn emit(tx: Option<&EventSender>, event: PipelineEvent) {
    let Some(tx) = tx else {
        return;
    };
    if event.is_tick() {
        let _ = tx.try_send(event);
    } else if tx.blocking_send(event).is_err() {
        tracing::trace!("event receiver closed");
    }
}
