//! Candidate ids and the remote/local names derived from them.
//!
//! A candidate id is a zero-padded integer; the URL template turns it into a
//! remote URL and `FileNaming` turns it into the local file name
//! (`app-0001.apk`).

mod id;
mod template;

pub use id::{CandidateId, CandidateRange};
pub use template::{FileNaming, UrlTemplate};
