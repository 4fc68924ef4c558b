//! `apksweep fetch <id>` – download one candidate.

use anyhow::{Context, Result};
use apksweep_core::config::SweepConfig;
use apksweep_core::fetch::FetchStatus;
use apksweep_core::pipeline::Pipeline;
use apksweep_core::target::CandidateId;
use std::path::PathBuf;

use super::{mib, output_root};

pub async fn run_fetch(cfg: SweepConfig, output: Option<PathBuf>, id: CandidateId) -> Result<()> {
    let root = output_root(&cfg, output)?;
    let pipeline = Pipeline::new(cfg, &root, None)?;
    let path = pipeline.output().path_for(&id);
    let outcome = tokio::task::spawn_blocking(move || pipeline.fetch_one(id))
        .await
        .context("fetch task panicked")?;

    match outcome.status {
        FetchStatus::AlreadyPresent => println!(
            "{} already present ({:.2} MiB)",
            path.display(),
            mib(outcome.bytes_written)
        ),
        FetchStatus::Downloaded => println!(
            "Saved {} ({:.2} MiB)",
            path.display(),
            mib(outcome.bytes_written)
        ),
        FetchStatus::Failed => anyhow::bail!(
            "download of {} failed: {}",
            id,
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
    Ok(())
}
