//! CLI command handlers, one per file.

mod fetch;
mod list;
mod probe;
mod run;

use anyhow::{Context, Result};
use apksweep_core::config::SweepConfig;
use apksweep_core::storage;
use std::path::PathBuf;

pub use fetch::run_fetch;
pub use list::run_list;
pub use probe::run_probe;
pub use run::run_sweep;

/// `--output` if given, else the directory named by the workspace env var,
/// else the current directory.
fn output_root(cfg: &SweepConfig, output: Option<PathBuf>) -> Result<PathBuf> {
    match output {
        Some(dir) => Ok(dir),
        None => storage::resolve_output_dir(cfg.workspace_env())
            .context("could not determine output directory"),
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}
