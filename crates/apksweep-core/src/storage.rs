//! Output directory lifecycle and on-disk state.
//!
//! The files themselves are the only durable record: a non-empty
//! `app-<id>.apk` means "done". Downloads are written to a `.part` sibling
//! and renamed into place only after the signature check passes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::target::{CandidateId, FileNaming};

/// Temporary file suffix used before the rename into place.
pub const TEMP_SUFFIX: &str = ".part";

/// Marker written and removed by the permission self-test.
pub const WRITE_TEST_FILE: &str = ".write_test";

/// Fatal problems with the local environment. Raised before any network
/// activity starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("output directory {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve the output directory: the directory named by `env_var` if set and
/// non-empty, else the current directory.
pub fn resolve_output_dir(env_var: &str) -> std::io::Result<PathBuf> {
    match std::env::var_os(env_var) {
        Some(v) if !v.is_empty() => Ok(PathBuf::from(v)),
        _ => std::env::current_dir(),
    }
}

/// Create `dir` if needed and prove it is writable by writing and deleting a
/// marker file.
pub fn prepare_output_dir(dir: &Path) -> Result<(), SetupError> {
    fs::create_dir_all(dir).map_err(|source| SetupError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let marker = dir.join(WRITE_TEST_FILE);
    let not_writable = |source| SetupError::NotWritable {
        path: dir.to_path_buf(),
        source,
    };
    let mut f = fs::File::create(&marker).map_err(not_writable)?;
    f.write_all(b"test").map_err(not_writable)?;
    drop(f);
    fs::remove_file(&marker).map_err(not_writable)?;
    Ok(())
}

/// Path for the temp file: appends `.part` to the final path (e.g. `app-0001.apk` -> `app-0001.apk.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Size of `path` if it exists, is a file, and is non-empty.
pub fn existing_size(path: &Path) -> Option<u64> {
    match fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Some(m.len()),
        _ => None,
    }
}

/// Remove a file, ignoring "not found".
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Where downloads for one run land and how they are named.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
    naming: FileNaming,
}

/// One archive found in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>, naming: FileNaming) -> Self {
        Self {
            root: root.into(),
            naming,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> &FileNaming {
        &self.naming
    }

    pub fn path_for(&self, id: &CandidateId) -> PathBuf {
        self.root.join(self.naming.file_name(id))
    }

    /// Non-empty file already present for `id`.
    pub fn existing(&self, id: &CandidateId) -> Option<u64> {
        existing_size(&self.path_for(id))
    }

    /// Archives currently in the directory, sorted by name.
    pub fn list(&self) -> std::io::Result<Vec<StoredFile>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.naming.matches(&name) {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                out.push(StoredFile {
                    name,
                    size: meta.len(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
