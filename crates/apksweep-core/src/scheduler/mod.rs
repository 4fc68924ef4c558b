//! Scheduling for both phases.
//!
//! The probe phase fans candidates out over a bounded worker pool; the
//! download phase drives the fetcher sequentially. Both report through
//! optional `PipelineEvent`s.

mod download;
mod governor;
pub mod progress;
mod scan;

pub use download::{download_confirmed, DownloadReport};
pub use governor::{ConcurrencyGovernor, DEFAULT_BLOCK_RATIO, DEFAULT_WINDOW};
pub use progress::{DownloadProgress, EventSender, PipelineEvent, ScanProgress};
pub use scan::{scan, ScanOptions, ScanReport};
