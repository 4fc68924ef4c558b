use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jitter::Jitter;
use crate::retry::RetryPolicy;
use crate::target::{CandidateRange, FileNaming, UrlTemplate};

/// Host the probe targets unless overridden.
pub const DEFAULT_URL_TEMPLATE: &str =
    "http://jinshan2.resource.zhibaowan.com/downbag2/XT/2017/app/app-%s.apk";

/// What to probe and how to name what we find.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Remote URL pattern with one `%s` for the zero-padded id.
    pub url_template: String,
    /// First candidate id (inclusive).
    pub start: u32,
    /// Last candidate id (inclusive).
    pub end: u32,
    /// Zero-padding width of the id token.
    pub id_width: usize,
    pub file_prefix: String,
    pub file_suffix: String,
    /// Origin sent as Referer/Origin; derived from `url_template` when unset.
    pub referer: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            start: 0,
            end: 9999,
            id_width: 4,
            file_prefix: "app-".to_string(),
            file_suffix: ".apk".to_string(),
            referer: None,
        }
    }
}

/// Probe phase tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Worker threads probing in parallel.
    pub max_workers: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub head_timeout_secs: u64,
    pub range_timeout_secs: u64,
    /// Wait after a 403 on the cheap check before the direct ranged read.
    pub soft_block_cooldown_secs: u64,
    pub soft_block_timeout_secs: u64,
    /// Bytes requested by the partial-content read.
    pub prefix_bytes: u64,
    /// Emit a progress event every N completed probes.
    pub progress_every: usize,
    /// Shrink the active worker count when soft blocks pile up.
    pub adaptive: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            jitter_min_ms: 50,
            jitter_max_ms: 100,
            head_timeout_secs: 15,
            range_timeout_secs: 20,
            soft_block_cooldown_secs: 2,
            soft_block_timeout_secs: 25,
            prefix_bytes: 1024,
            progress_every: 100,
            adaptive: false,
        }
    }
}

/// Download phase tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum attempts per file (including the first).
    pub max_attempts: u32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub soft_block_cooldown_min_secs: u64,
    pub soft_block_cooldown_max_secs: u64,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            jitter_min_ms: 2000,
            jitter_max_ms: 4000,
            soft_block_cooldown_min_secs: 5,
            soft_block_cooldown_max_secs: 10,
            backoff_min_secs: 3,
            backoff_max_secs: 6,
            timeout_secs: 120,
            connect_timeout_secs: 30,
        }
    }
}

/// Upstream proxy rotation. Disabled unless `discovery_url` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub discovery_url: Option<String>,
    pub health_url: String,
    pub health_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    /// Requests per proxy before rotating.
    pub max_uses: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            discovery_url: None,
            health_url: crate::proxy::DEFAULT_HEALTH_URL.to_string(),
            health_timeout_secs: 5,
            discovery_timeout_secs: 15,
            max_uses: 10,
        }
    }
}

/// Global configuration loaded from `~/.config/apksweep/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Environment variable naming the output directory (falls back to cwd).
    pub workspace_env: Option<String>,
    pub target: TargetConfig,
    pub probe: ProbeConfig,
    pub download: DownloadConfig,
    pub proxy: ProxyConfig,
}

impl SweepConfig {
    pub fn workspace_env(&self) -> &str {
        self.workspace_env.as_deref().unwrap_or("GITHUB_WORKSPACE")
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let t = &self.target;
        UrlTemplate::parse(&t.url_template)?;
        if t.start > t.end {
            anyhow::bail!("target.start ({}) is greater than target.end ({})", t.start, t.end);
        }
        if t.id_width == 0 || t.end.to_string().len() > t.id_width {
            anyhow::bail!("target.end ({}) does not fit in {} digits", t.end, t.id_width);
        }
        if self.probe.max_workers == 0 {
            anyhow::bail!("probe.max_workers must be at least 1");
        }
        if self.probe.jitter_min_ms > self.probe.jitter_max_ms {
            anyhow::bail!("probe.jitter_min_ms must not exceed probe.jitter_max_ms");
        }
        if self.download.jitter_min_ms > self.download.jitter_max_ms {
            anyhow::bail!("download.jitter_min_ms must not exceed download.jitter_max_ms");
        }
        if self.download.max_attempts == 0 {
            anyhow::bail!("download.max_attempts must be at least 1");
        }
        if self.proxy.max_uses == 0 {
            anyhow::bail!("proxy.max_uses must be at least 1");
        }
        Ok(())
    }

    pub fn range(&self) -> CandidateRange {
        CandidateRange::new(self.target.start, self.target.end, self.target.id_width)
    }

    pub fn url_template(&self) -> Result<UrlTemplate> {
        UrlTemplate::parse(&self.target.url_template)
    }

    /// Origin for the Referer/Origin headers.
    pub fn referer_origin(&self) -> Result<Option<String>> {
        match self.target.referer.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => Ok(Some(r.trim_end_matches('/').to_string())),
            _ => Ok(self.url_template()?.origin()),
        }
    }

    pub fn file_naming(&self) -> FileNaming {
        FileNaming {
            prefix: self.target.file_prefix.clone(),
            suffix: self.target.file_suffix.clone(),
        }
    }

    pub fn probe_jitter(&self) -> Jitter {
        Jitter::from_millis(self.probe.jitter_min_ms, self.probe.jitter_max_ms)
    }

    pub fn download_jitter(&self) -> Jitter {
        Jitter::from_millis(self.download.jitter_min_ms, self.download.jitter_max_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let d = &self.download;
        RetryPolicy {
            max_attempts: d.max_attempts,
            soft_block_cooldown: Jitter::from_secs(
                d.soft_block_cooldown_min_secs,
                d.soft_block_cooldown_max_secs,
            ),
            backoff: Jitter::from_secs(d.backoff_min_secs, d.backoff_max_secs),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("apksweep")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

fn write_default(path: &Path, cfg: &SweepConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml)?;
    Ok(())
}

/// Load configuration from disk, creating a default file if none exists.
/// An unusable config location is not fatal: the defaults are used and a
/// warning is logged. A config file that exists but does not parse is an error.
pub fn load_or_init() -> Result<SweepConfig> {
    let path = match config_path() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("no usable config directory ({:#}); using defaults", e);
            return Ok(SweepConfig::default());
        }
    };
    if !path.exists() {
        let default_cfg = SweepConfig::default();
        match write_default(&path, &default_cfg) {
            Ok(()) => tracing::info!("created default config at {}", path.display()),
            Err(e) => tracing::warn!(
                "could not write default config to {} ({:#}); using defaults",
                path.display(),
                e
            ),
        }
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<SweepConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: SweepConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = SweepConfig::default();
        assert_eq!(cfg.target.start, 0);
        assert_eq!(cfg.target.end, 9999);
        assert_eq!(cfg.target.id_width, 4);
        assert_eq!(cfg.probe.max_workers, 4);
        assert_eq!(cfg.download.max_attempts, 3);
        assert_eq!(cfg.proxy.max_uses, 10);
        assert!(cfg.proxy.discovery_url.is_none());
        assert_eq!(cfg.workspace_env(), "GITHUB_WORKSPACE");
        cfg.validate().unwrap();
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = SweepConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: SweepConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.target.url_template, cfg.target.url_template);
        assert_eq!(parsed.probe.max_workers, cfg.probe.max_workers);
        assert_eq!(parsed.download.timeout_secs, cfg.download.timeout_secs);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            [target]
            start = 7500
            end = 7990

            [probe]
            max_workers = 3
            adaptive = true

            [proxy]
            discovery_url = "http://proxies.example.com/list"
            max_uses = 5
        "#;
        let cfg: SweepConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.target.start, 7500);
        assert_eq!(cfg.target.end, 7990);
        assert_eq!(cfg.target.id_width, 4);
        assert_eq!(cfg.probe.max_workers, 3);
        assert!(cfg.probe.adaptive);
        assert_eq!(cfg.probe.progress_every, 100);
        assert_eq!(cfg.proxy.max_uses, 5);
        assert_eq!(cfg.download.max_attempts, 3);
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_ranges_and_templates() {
        let mut cfg = SweepConfig::default();
        cfg.target.start = 10;
        cfg.target.end = 5;
        assert!(cfg.validate().is_err());

        let mut cfg = SweepConfig::default();
        cfg.target.end = 10_000;
        assert!(cfg.validate().is_err(), "5 digits do not fit width 4");

        let mut cfg = SweepConfig::default();
        cfg.target.url_template = "http://example.com/app.apk".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SweepConfig::default();
        cfg.probe.max_workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn referer_defaults_to_template_origin() {
        let mut cfg = SweepConfig::default();
        cfg.target.url_template = "http://files.example.com:8080/app/app-%s.apk".to_string();
        assert_eq!(
            cfg.referer_origin().unwrap().as_deref(),
            Some("http://files.example.com:8080")
        );
        cfg.target.referer = Some("https://mirror.example.org/".to_string());
        assert_eq!(
            cfg.referer_origin().unwrap().as_deref(),
            Some("https://mirror.example.org")
        );
    }

    #[test]
    fn retry_policy_follows_download_section() {
        let mut cfg = SweepConfig::default();
        cfg.download.max_attempts = 5;
        cfg.download.backoff_min_secs = 1;
        cfg.download.backoff_max_secs = 1;
        let p = cfg.retry_policy();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.backoff, Jitter::fixed(Duration::from_secs(1)));
    }

    #[test]
    fn write_default_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let res = write_default(&blocker.join("apksweep").join("config.toml"), &SweepConfig::default());
        assert!(res.is_err());
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "workspace_env = \"OUT_DIR_FOR_TEST\"\n").unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.workspace_env(), "OUT_DIR_FOR_TEST");
    }
}
