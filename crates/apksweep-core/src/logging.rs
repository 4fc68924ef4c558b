//! Tracing setup.
//!
//! Runs log to `~/.local/state/apksweep/apksweep.log` with thread names, since
//! probe workers interleave. Human progress goes to stdout from the CLI, so
//! the file is the only place per-request detail (soft blocks, proxy
//! rotation, retries) ends up. `APKSWEEP_LOG` overrides `RUST_LOG`.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const FILE_FILTER: &str = "info,apksweep_core=debug";
const STDERR_FILTER: &str = "warn";
const FILTER_ENV: &str = "APKSWEEP_LOG";
const LOG_FILE_NAME: &str = "apksweep.log";

/// Per-event handle on the shared log file. Degrades to stderr when the
/// descriptor cannot be duplicated.
enum LogSink {
    File(fs::File),
    Stderr,
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct AppendLog(fs::File);

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => LogSink::File(f),
            Err(_) => LogSink::Stderr,
        }
    }
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default))
}

/// Where the log file lives (XDG state dir); the directory is created.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("apksweep")?;
    Ok(xdg_dirs.place_state_file(LOG_FILE_NAME)?)
}

/// Install the file subscriber. Errors (unwritable state dir, subscriber
/// already set) are returned so the caller can use `init_logging_stderr`.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_path()?;
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(FILE_FILTER))
        .with_writer(AppendLog(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(pid = std::process::id(), "logging to {}", path.display());
    Ok(path)
}

/// Warnings and errors to stderr only.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(STDERR_FILTER))
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}
