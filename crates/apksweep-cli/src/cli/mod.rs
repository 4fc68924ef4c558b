//! CLI for the apksweep range prober.

mod commands;

use anyhow::{Context, Result};
use apksweep_core::config::{self, SweepConfig};
use apksweep_core::target::CandidateId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_fetch, run_list, run_probe, run_sweep};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "apksweep")]
#[command(about = "Probe a numeric URL range for archives and download the ones that exist", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (default: ~/.config/apksweep/config.toml, created if missing).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory (default: $GITHUB_WORKSPACE or the current directory).
    #[arg(long, short = 'o', global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Never route requests through discovered proxies.
    #[arg(long, global = true)]
    pub no_proxy: bool,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Probe the whole range, then download every confirmed archive.
    Run {
        /// First candidate id (overrides config).
        #[arg(long)]
        start: Option<u32>,
        /// Last candidate id, inclusive (overrides config).
        #[arg(long)]
        end: Option<u32>,
        /// Probe workers (overrides config).
        #[arg(long, short = 'w', value_name = "N")]
        workers: Option<usize>,
        /// Shrink the worker count automatically when the host starts answering 403.
        #[arg(long)]
        adaptive: bool,
    },

    /// Probe a single candidate and print its verdict.
    Probe {
        /// Candidate id, e.g. 42 or 0042.
        id: String,
    },

    /// Download a single candidate without probing the range.
    Fetch {
        /// Candidate id, e.g. 42 or 0042.
        id: String,
    },

    /// List archives already in the output directory.
    List,
}

/// Loads the config from `--config` or the default location.
fn load_config(global: &GlobalOpts) -> Result<SweepConfig> {
    match &global.config {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

/// Applies command-line overrides on top of the loaded config.
pub(crate) fn apply_overrides(cfg: &mut SweepConfig, global: &GlobalOpts, command: &CliCommand) {
    if global.no_proxy {
        cfg.proxy.discovery_url = None;
    }
    if let CliCommand::Run {
        start,
        end,
        workers,
        adaptive,
    } = command
    {
        if let Some(s) = start {
            cfg.target.start = *s;
        }
        if let Some(e) = end {
            cfg.target.end = *e;
        }
        if let Some(w) = workers {
            cfg.probe.max_workers = *w;
        }
        if *adaptive {
            cfg.probe.adaptive = true;
        }
    }
}

pub(crate) fn parse_id(token: &str, cfg: &SweepConfig) -> Result<CandidateId> {
    CandidateId::parse(token, cfg.target.id_width)
        .with_context(|| format!("'{}' is not a candidate id", token))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = load_config(&cli.global)?;
        apply_overrides(&mut cfg, &cli.global, &cli.command);
        tracing::debug!("loaded config: {:?}", cfg);
        let output = cli.global.output;

        match cli.command {
            CliCommand::Run { .. } => run_sweep(cfg, output).await?,
            CliCommand::Probe { id } => {
                let id = parse_id(&id, &cfg)?;
                run_probe(cfg, output, id).await?;
            }
            CliCommand::Fetch { id } => {
                let id = parse_id(&id, &cfg)?;
                run_fetch(cfg, output, id).await?;
            }
            CliCommand::List => run_list(&cfg, output)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
