//! `apksweep run` – probe the range and download what was found.

use anyhow::{Context, Result};
use apksweep_core::config::SweepConfig;
use apksweep_core::pipeline::{Pipeline, RunReport};
use apksweep_core::scheduler::PipelineEvent;
use std::path::PathBuf;

use super::{mib, output_root};

pub async fn run_sweep(cfg: SweepConfig, output: Option<PathBuf>) -> Result<()> {
    let root = output_root(&cfg, output)?;
    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<PipelineEvent>(256);
    let pipeline = Pipeline::new(cfg, &root, Some(events_tx))?;

    let range = pipeline.config().range();
    println!("Output directory: {}", root.display());
    println!(
        "Probing {} ({} candidates)",
        pipeline.config().target.url_template,
        range.len()
    );
    let existing = pipeline.output().list().unwrap_or_default();
    if !existing.is_empty() {
        println!("{} archive(s) already present:", existing.len());
        for f in &existing {
            println!("  {} ({:.2} MiB)", f.name, mib(f.size));
        }
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_event(&event);
        }
    });

    let report = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .context("pipeline task panicked")??;
    let _ = printer.await;

    print_report(&report);
    Ok(())
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::ScanStarted { total, workers } => {
            println!("Scanning {} candidates with {} worker(s)", total, workers);
        }
        PipelineEvent::Scan(p) => {
            println!(
                "Progress: {}% ({}/{}) found: {} workers: {}",
                p.percent(),
                p.completed,
                p.total,
                p.found,
                p.active_workers
            );
        }
        PipelineEvent::Found(v) => {
            println!(
                "[+] Found: {} ({} bytes, {})",
                v.url, v.size, v.detection_method
            );
        }
        PipelineEvent::ScanFinished {
            scanned,
            found,
            elapsed_secs,
        } => {
            println!(
                "Scan finished: {} scanned, {} found in {:.1}s",
                scanned, found, elapsed_secs
            );
        }
        PipelineEvent::AlreadyPresent { id, size } => {
            println!("[=] {} already present ({} bytes), skipping", id, size);
        }
        PipelineEvent::DownloadStarted { id, index, count } => {
            println!("[{}/{}] Downloading {}", index, count, id);
        }
        PipelineEvent::Download(p) => {
            if let Some(pct) = p.percent() {
                if pct % 10 == 0 {
                    println!(
                        "  {}: {}% ({:.2} MiB) attempt {}",
                        p.id,
                        pct,
                        mib(p.bytes_done),
                        p.attempt
                    );
                }
            }
        }
        PipelineEvent::Downloaded { id, bytes } => {
            println!("[✓] {} saved ({:.2} MiB)", id, mib(*bytes));
        }
        PipelineEvent::DownloadFailed { id, error } => {
            println!("[✗] {} failed: {}", id, error);
        }
    }
}

fn print_report(report: &RunReport) {
    let d = &report.downloads;
    println!();
    println!("Finished in {:.1}s", report.elapsed.as_secs_f64());
    println!(
        "Scanned: {}  confirmed: {}  soft-blocked: {}",
        report.scanned,
        report.confirmed.len(),
        report.soft_blocked
    );
    println!(
        "Downloaded: {} ({:.2} MiB)  already present: {}  failed: {}",
        d.downloaded,
        mib(d.bytes_written),
        d.already_present,
        d.failed
    );
    if report.files.is_empty() {
        println!("No archives in output directory.");
        return;
    }
    println!("{:<24} {:>12}", "FILE", "SIZE");
    for f in &report.files {
        println!("{:<24} {:>9.2} MiB", f.name, mib(f.size));
    }
    println!(
        "{} file(s), {:.2} MiB total",
        report.files.len(),
        mib(report.total_bytes_on_disk())
    );
}
