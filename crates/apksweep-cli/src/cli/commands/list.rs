//! `apksweep list` – show archives in the output directory.

use anyhow::{Context, Result};
use apksweep_core::config::SweepConfig;
use apksweep_core::storage::OutputDir;
use std::path::PathBuf;

use super::{mib, output_root};

pub fn run_list(cfg: &SweepConfig, output: Option<PathBuf>) -> Result<()> {
    let root = output_root(cfg, output)?;
    let dir = OutputDir::new(&root, cfg.file_naming());
    let files = dir
        .list()
        .with_context(|| format!("failed to list {}", root.display()))?;
    if files.is_empty() {
        println!("No archives in {}.", root.display());
        return Ok(());
    }
    println!("{:<24} {:>12}", "FILE", "SIZE");
    let mut total = 0u64;
    for f in &files {
        total += f.size;
        println!("{:<24} {:>9.2} MiB", f.name, mib(f.size));
    }
    println!("{} file(s), {:.2} MiB total", files.len(), mib(total));
    Ok(())
}
