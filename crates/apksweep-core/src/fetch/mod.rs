//! Full download of one confirmed candidate.
//!
//! The body streams into `<name>.part`; only a non-empty file that starts
//! with the archive signature is renamed to its final name. Every failure
//! path removes the temp file, so a file that fails validation never stays
//! on disk.

use std::cell::Cell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SweepConfig;
use crate::http::{self, RequestOptions};
use crate::identity::IdentityRotator;
use crate::jitter::Jitter;
use crate::proxy::ProxyRotator;
use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::scheduler::progress::{emit, DownloadProgress, EventSender, PipelineEvent};
use crate::signature::file_matches_signature;
use crate::storage::{self, OutputDir};
use crate::target::CandidateId;

/// Write buffer between curl and the temp file.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// Timing knobs for downloads.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Delay before every attempt, retries included.
    pub jitter: Jitter,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl FetchSettings {
    pub fn from_config(cfg: &SweepConfig) -> Self {
        Self {
            jitter: cfg.download_jitter(),
            connect_timeout: Duration::from_secs(cfg.download.connect_timeout_secs),
            timeout: cfg.download_timeout(),
            retry: cfg.retry_policy(),
        }
    }
}

/// How a fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// A non-empty file was already on disk; no request was made.
    AlreadyPresent,
    Downloaded,
    Failed,
}

/// Result of `Fetcher::fetch`, derived from what ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub id: CandidateId,
    pub success: bool,
    pub bytes_written: u64,
    pub status: FetchStatus,
    pub error: Option<String>,
}

pub struct Fetcher {
    out: OutputDir,
    identity: Arc<IdentityRotator>,
    proxies: Arc<ProxyRotator>,
    settings: FetchSettings,
    events: Option<EventSender>,
}

impl Fetcher {
    pub fn new(
        out: OutputDir,
        identity: Arc<IdentityRotator>,
        proxies: Arc<ProxyRotator>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            out,
            identity,
            proxies,
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    pub fn output(&self) -> &OutputDir {
        &self.out
    }

    /// Downloads `url` to the file for `id`. Idempotent: an existing
    /// non-empty file short-circuits to success without touching the network
    /// or re-checking its signature.
    pub fn fetch(&self, id: CandidateId, url: &str) -> FetchOutcome {
        let final_path = self.out.path_for(&id);
        if let Some(size) = storage::existing_size(&final_path) {
            tracing::debug!(id = %id, size, "already present; skipping download");
            return FetchOutcome {
                id,
                success: true,
                bytes_written: size,
                status: FetchStatus::AlreadyPresent,
                error: None,
            };
        }

        let result = run_with_retry(&self.settings.retry, |attempt| {
            self.attempt(&id, url, attempt, &final_path)
        });
        match result {
            Ok(bytes) => {
                tracing::info!(id = %id, bytes, "download complete");
                FetchOutcome {
                    id,
                    success: true,
                    bytes_written: bytes,
                    status: FetchStatus::Downloaded,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(id = %id, "download failed: {}", e);
                let tmp = storage::temp_path(&final_path);
                if let Err(rm) = storage::remove_if_exists(&tmp) {
                    tracing::warn!(path = %tmp.display(), "could not remove partial file: {}", rm);
                }
                FetchOutcome {
                    id,
                    success: false,
                    bytes_written: 0,
                    status: FetchStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// One attempt: download to the temp file, validate, rename into place.
    fn attempt(
        &self,
        id: &CandidateId,
        url: &str,
        attempt: u32,
        final_path: &Path,
    ) -> Result<u64, TransferError> {
        self.settings.jitter.sleep();
        let tmp = storage::temp_path(final_path);
        let result = self
            .download_to(id, url, attempt, &tmp)
            .and_then(|bytes| self.validate(&tmp, bytes))
            .and_then(|bytes| {
                std::fs::rename(&tmp, final_path)?;
                Ok(bytes)
            });
        if let Err(e) = &result {
            if let TransferError::Http(403) = e {
                tracing::warn!(id = %id, attempt, "download refused with 403");
            }
            if let Err(rm) = storage::remove_if_exists(&tmp) {
                tracing::warn!(path = %tmp.display(), "could not remove partial file: {}", rm);
            }
        }
        result
    }

    fn download_to(
        &self,
        id: &CandidateId,
        url: &str,
        attempt: u32,
        tmp: &Path,
    ) -> Result<u64, TransferError> {
        let file = File::create(tmp)?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let total: Cell<Option<u64>> = Cell::new(None);
        let done: Cell<u64> = Cell::new(0);
        let last_pct: Cell<Option<u64>> = Cell::new(None);
        let events = self.events.as_ref();

        let opts = RequestOptions {
            user_agent: self.identity.next_identity(),
            headers: self.identity.headers(),
            proxy: None,
            connect_timeout: self.settings.connect_timeout,
            timeout: self.settings.timeout,
        };
        tracing::debug!(id = %id, attempt, "downloading {}", url);
        let resp = self.proxies.with_proxy(|proxy| {
            http::stream_get(
                url,
                &RequestOptions { proxy, ..opts.clone() },
                |chunk| {
                    writer.write_all(chunk)?;
                    done.set(done.get() + chunk.len() as u64);
                    let progress = DownloadProgress {
                        id: *id,
                        attempt,
                        bytes_done: done.get(),
                        total_bytes: total.get(),
                    };
                    let pct = progress.percent();
                    if pct.is_some() && pct != last_pct.get() {
                        last_pct.set(pct);
                        emit(events, PipelineEvent::Download(progress));
                    }
                    Ok(())
                },
                |headers| total.set(headers.content_length),
            )
        })?;
        if resp.headers.status != 200 {
            return Err(TransferError::Http(resp.headers.status));
        }
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(resp.bytes)
    }

    fn validate(&self, tmp: &Path, bytes: u64) -> Result<u64, TransferError> {
        if bytes == 0 || storage::existing_size(tmp).is_none() {
            return Err(TransferError::Empty);
        }
        if !file_matches_signature(tmp)? {
            return Err(TransferError::SignatureMismatch);
        }
        Ok(bytes)
    }
}
