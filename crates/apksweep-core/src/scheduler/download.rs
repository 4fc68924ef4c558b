//! Download phase: confirmed set minus what is already on disk, one file at
//! a time. Per-file failures are counted, never fatal.

use crate::fetch::{FetchOutcome, FetchStatus, Fetcher};
use crate::probe::Verdict;

use super::progress::{emit, EventSender, PipelineEvent};

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub outcomes: Vec<FetchOutcome>,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
    /// Bytes written by this run (already-present files excluded).
    pub bytes_written: u64,
}

impl DownloadReport {
    fn push(&mut self, outcome: FetchOutcome) {
        match outcome.status {
            FetchStatus::Downloaded => {
                self.downloaded += 1;
                self.bytes_written += outcome.bytes_written;
            }
            FetchStatus::AlreadyPresent => self.already_present += 1,
            FetchStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Fetches every confirmed candidate in order.
pub fn download_confirmed(
    fetcher: &Fetcher,
    confirmed: &[Verdict],
    events: Option<&EventSender>,
) -> DownloadReport {
    let mut report = DownloadReport::default();
    let (present, pending): (Vec<&Verdict>, Vec<&Verdict>) = confirmed
        .iter()
        .partition(|v| fetcher.output().existing(&v.id).is_some());

    for v in present {
        let outcome = fetcher.fetch(v.id, &v.url);
        emit(
            events,
            PipelineEvent::AlreadyPresent {
                id: v.id,
                size: outcome.bytes_written,
            },
        );
        report.push(outcome);
    }

    let count = pending.len();
    tracing::info!(count, skipped = report.already_present, "download phase started");
    for (index, v) in pending.into_iter().enumerate() {
        emit(
            events,
            PipelineEvent::DownloadStarted {
                id: v.id,
                index: index + 1,
                count,
            },
        );
        let outcome = fetcher.fetch(v.id, &v.url);
        match outcome.status {
            FetchStatus::Failed => emit(
                events,
                PipelineEvent::DownloadFailed {
                    id: v.id,
                    error: outcome.error.clone().unwrap_or_default(),
                },
            ),
            _ => emit(
                events,
                PipelineEvent::Downloaded {
                    id: v.id,
                    bytes: outcome.bytes_written,
                },
            ),
        }
        report.push(outcome);
    }
    report
}
