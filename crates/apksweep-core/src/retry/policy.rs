use std::time::Duration;

use crate::jitter::Jitter;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 403: rate limiting or transient denial, not absence.
    SoftBlock,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Operation timed out (connect/read).
    Timeout,
    /// Network-level failure (connection reset, DNS, proxy, etc.).
    Connection,
    /// Any other HTTP status.
    Http(u16),
    /// Body was not an archive. Permanent.
    ContentMismatch,
    /// Local disk failure. Permanent for this run.
    Storage,
    /// Anything else (empty body, unexpected curl error).
    Other,
}

impl ErrorKind {
    /// Permanent kinds are never retried at the same layer.
    pub fn is_permanent(self) -> bool {
        matches!(self, ErrorKind::ContentMismatch | ErrorKind::Storage)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded retry with two delay regimes: a long cooldown after a soft block
/// and a shorter randomised backoff for everything else that is transient.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Wait after a 403 before trying again.
    pub soft_block_cooldown: Jitter,
    /// Wait after any other transient failure.
    pub backoff: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            soft_block_cooldown: Jitter::from_secs(5, 10),
            backoff: Jitter::from_secs(3, 6),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// when we should stop retrying.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || kind.is_permanent() {
            return RetryDecision::NoRetry;
        }
        match kind {
            ErrorKind::SoftBlock => RetryDecision::RetryAfter(self.soft_block_cooldown.sample()),
            _ => RetryDecision::RetryAfter(self.backoff.sample()),
        }
    }
}
