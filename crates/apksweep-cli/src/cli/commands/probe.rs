//! `apksweep probe <id>` – check one candidate.

use anyhow::{Context, Result};
use apksweep_core::config::SweepConfig;
use apksweep_core::pipeline::Pipeline;
use apksweep_core::target::CandidateId;
use std::path::PathBuf;

use super::output_root;

pub async fn run_probe(cfg: SweepConfig, output: Option<PathBuf>, id: CandidateId) -> Result<()> {
    let root = output_root(&cfg, output)?;
    let pipeline = Pipeline::new(cfg, &root, None)?;
    let verdict = tokio::task::spawn_blocking(move || pipeline.probe_one(id))
        .await
        .context("probe task panicked")?;

    println!("id:      {}", verdict.id);
    println!("url:     {}", verdict.url);
    println!("valid:   {}", verdict.valid);
    println!("size:    {}", verdict.size);
    println!("method:  {}", verdict.detection_method);
    if verdict.soft_blocked {
        println!("note:    cheap check answered 403");
    }
    if let Some(err) = &verdict.error {
        println!("error:   {}", err);
    }
    Ok(())
}
