//! Run orchestration: output directory check, probe phase, download phase,
//! final report.
//!
//! Everything is blocking; async callers run it under `spawn_blocking` and
//! listen on the event channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::SweepConfig;
use crate::fetch::{FetchOutcome, FetchSettings, Fetcher};
use crate::identity::IdentityRotator;
use crate::probe::{CandidateProber, ProbeSettings, Prober, Verdict};
use crate::proxy::{EchoHealthCheck, HttpProxySource, ProxyRotator};
use crate::scheduler::{
    download_confirmed, scan, ConcurrencyGovernor, DownloadReport, EventSender, ScanOptions,
};
use crate::storage::{self, OutputDir, StoredFile};
use crate::target::CandidateId;

/// Summary handed back to the caller after a full run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub elapsed: Duration,
    pub scanned: usize,
    pub confirmed: Vec<Verdict>,
    pub soft_blocked: usize,
    pub downloads: DownloadReport,
    /// Archives on disk after the run, sorted by name.
    pub files: Vec<StoredFile>,
}

impl RunReport {
    pub fn total_bytes_on_disk(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Builds the proxy rotator described by `[proxy]`: direct when no discovery
/// URL is configured.
pub fn build_proxy_rotator(cfg: &SweepConfig) -> ProxyRotator {
    let p = &cfg.proxy;
    match p.discovery_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => ProxyRotator::new(
            p.max_uses,
            Box::new(HttpProxySource::new(
                url,
                Duration::from_secs(p.discovery_timeout_secs),
            )),
            Box::new(EchoHealthCheck::new(
                p.health_url.clone(),
                Duration::from_secs(p.health_timeout_secs),
            )),
        ),
        None => ProxyRotator::direct(),
    }
}

/// The wired-up components for one output directory.
pub struct Pipeline {
    cfg: SweepConfig,
    prober: Arc<Prober>,
    fetcher: Fetcher,
    proxies: Arc<ProxyRotator>,
    events: Option<EventSender>,
}

impl Pipeline {
    /// Validates the config and proves `out_root` is writable. Nothing here
    /// touches the network, so an unusable directory aborts before any request.
    pub fn new(cfg: SweepConfig, out_root: &Path, events: Option<EventSender>) -> Result<Self> {
        cfg.validate().context("invalid configuration")?;
        storage::prepare_output_dir(out_root)?;
        let template = cfg.url_template()?;
        let origin = cfg.referer_origin()?;
        let identity = Arc::new(IdentityRotator::with_origin(origin.as_deref()));
        let proxies = Arc::new(build_proxy_rotator(&cfg));
        let prober = Arc::new(Prober::new(
            template,
            Arc::clone(&identity),
            Arc::clone(&proxies),
            ProbeSettings::from_config(&cfg),
        ));
        let out = OutputDir::new(out_root, cfg.file_naming());
        let fetcher = Fetcher::new(out, identity, Arc::clone(&proxies), FetchSettings::from_config(&cfg))
            .with_events(events.clone());
        Ok(Self {
            cfg,
            prober,
            fetcher,
            proxies,
            events,
        })
    }

    /// Resolves the output directory from the workspace env var, then builds.
    pub fn from_env(cfg: SweepConfig, events: Option<EventSender>) -> Result<Self> {
        let root: PathBuf = storage::resolve_output_dir(cfg.workspace_env())
            .context("could not determine output directory")?;
        Self::new(cfg, &root, events)
    }

    pub fn output(&self) -> &OutputDir {
        self.fetcher.output()
    }

    pub fn config(&self) -> &SweepConfig {
        &self.cfg
    }

    fn scan_options(&self) -> ScanOptions {
        let p = &self.cfg.probe;
        ScanOptions {
            workers: p.max_workers,
            progress_every: p.progress_every,
            governor: p
                .adaptive
                .then(|| Arc::new(ConcurrencyGovernor::new(p.max_workers))),
        }
    }

    /// Probe a single id (no download).
    pub fn probe_one(&self, id: CandidateId) -> Verdict {
        self.prober.probe(id)
    }

    /// Download a single id without probing it first.
    pub fn fetch_one(&self, id: CandidateId) -> FetchOutcome {
        let url = self.prober.url_for(&id);
        self.fetcher.fetch(id, &url)
    }

    /// Full two-phase run over the configured range.
    pub fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let range = self.cfg.range();
        tracing::info!(
            start = range.start,
            end = range.end,
            output = %self.output().root().display(),
            "run started"
        );

        let prober: Arc<dyn CandidateProber> = self.prober.clone();
        let scan_report = scan(prober, range.ids(), &self.scan_options(), self.events.as_ref());
        let confirmed = scan_report.confirmed();
        let downloads = download_confirmed(&self.fetcher, &confirmed, self.events.as_ref());
        let files = match self.output().list() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    output = %self.output().root().display(),
                    "could not list output directory: {}",
                    e
                );
                Vec::new()
            }
        };

        if !self.proxies.is_direct() {
            tracing::info!(rotations = self.proxies.rotations(), "proxy usage");
        }
        let report = RunReport {
            elapsed: started.elapsed(),
            scanned: scan_report.verdicts.len(),
            soft_blocked: scan_report.soft_blocked(),
            confirmed,
            downloads,
            files,
        };
        tracing::info!(
            scanned = report.scanned,
            confirmed = report.confirmed.len(),
            downloaded = report.downloads.downloaded,
            failed = report.downloads.failed,
            "run finished"
        );
        Ok(report)
    }
}
