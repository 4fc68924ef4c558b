//! Retry and backoff policy.
//!
//! Error classification (soft blocks, timeouts, connection failures, content
//! mismatches) and the per-attempt retry decision live here so the fetcher and
//! the prober share one vocabulary for what went wrong.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
