//! Transfer error type for retry classification.

use std::fmt;

/// Error returned by a single request attempt (curl failure, HTTP status,
/// storage failure, or a body that is not a valid archive).
/// Kept separate from anyhow so callers can classify before deciding to retry.
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, DNS, proxy, etc.).
    Curl(curl::Error),
    /// Response had a status the caller did not accept.
    Http(u32),
    /// Disk/storage write failed (e.g. disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// Transfer finished but nothing was written.
    Empty,
    /// Body does not start with the archive signature. Not retried.
    SignatureMismatch,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Storage(e) => write!(f, "storage: {}", e),
            TransferError::Empty => write!(f, "empty response body"),
            TransferError::SignatureMismatch => write!(f, "body is not a valid archive"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            TransferError::Http(_) | TransferError::Empty | TransferError::SignatureMismatch => None,
        }
    }
}

impl From<curl::Error> for TransferError {
    fn from(e: curl::Error) -> Self {
        TransferError::Curl(e)
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Storage(e)
    }
}
