//! Existence probing for one candidate.
//!
//! Each probe is a small state machine:
//!
//! ```text
//! Start -> HEAD -> 200 -> ranged GET -> signature? -> Confirmed(HEAD+GET) | Rejected
//!               -> 403 -> SoftBlocked -> cooldown -> ranged GET -> Confirmed(GET-RANGE) | Rejected
//!               -> other status / transport error -> Failed
//! ```
//!
//! No state retries: a candidate that fails is recorded and the scan moves
//! on. Nothing here writes to disk.

mod verdict;

pub use verdict::{DetectionMethod, Verdict};

use std::sync::Arc;
use std::time::Duration;

use crate::config::SweepConfig;
use crate::http::{self, PrefixResponse, RequestOptions, ResponseHeaders};
use crate::identity::IdentityRotator;
use crate::jitter::Jitter;
use crate::proxy::ProxyRotator;
use crate::retry::TransferError;
use crate::signature::{matches_signature, INSPECT_LEN};
use crate::target::{CandidateId, UrlTemplate};

/// Anything that can turn a candidate into a verdict. The scan scheduler
/// only depends on this.
pub trait CandidateProber: Send + Sync {
    fn probe(&self, id: CandidateId) -> Verdict;
}

/// Timing and size knobs for one probe.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub jitter: Jitter,
    pub connect_timeout: Duration,
    pub head_timeout: Duration,
    pub range_timeout: Duration,
    pub soft_block_cooldown: Duration,
    pub soft_block_timeout: Duration,
    /// Bytes asked for by the partial-content read.
    pub prefix_bytes: u64,
}

impl ProbeSettings {
    pub fn from_config(cfg: &SweepConfig) -> Self {
        let p = &cfg.probe;
        Self {
            jitter: cfg.probe_jitter(),
            connect_timeout: Duration::from_secs(p.head_timeout_secs),
            head_timeout: Duration::from_secs(p.head_timeout_secs),
            range_timeout: Duration::from_secs(p.range_timeout_secs),
            soft_block_cooldown: Duration::from_secs(p.soft_block_cooldown_secs),
            soft_block_timeout: Duration::from_secs(p.soft_block_timeout_secs),
            prefix_bytes: p.prefix_bytes.max(INSPECT_LEN as u64),
        }
    }
}

enum Step {
    Start,
    Confirmed { size: u64, method: DetectionMethod },
    Rejected { soft_blocked: bool },
    SoftBlocked,
    Failed { soft_blocked: bool, error: String },
}

/// HTTP prober over a URL template.
#[derive(Debug, Clone)]
pub struct Prober {
    template: UrlTemplate,
    identity: Arc<IdentityRotator>,
    proxies: Arc<ProxyRotator>,
    settings: ProbeSettings,
}

impl Prober {
    pub fn new(
        template: UrlTemplate,
        identity: Arc<IdentityRotator>,
        proxies: Arc<ProxyRotator>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            template,
            identity,
            proxies,
            settings,
        }
    }

    pub fn url_for(&self, id: &CandidateId) -> String {
        self.template.expand(id)
    }

    fn options(&self, timeout: Duration) -> RequestOptions<'_> {
        RequestOptions {
            user_agent: self.identity.next_identity(),
            headers: self.identity.headers(),
            proxy: None,
            connect_timeout: self.settings.connect_timeout,
            timeout,
        }
    }

    fn cheap_check(&self, url: &str) -> Result<ResponseHeaders, TransferError> {
        let opts = self.options(self.settings.head_timeout);
        self.proxies.with_proxy(|proxy| {
            http::head(url, &RequestOptions { proxy, ..opts.clone() })
        })
    }

    fn read_prefix(&self, url: &str, timeout: Duration) -> Result<PrefixResponse, TransferError> {
        let opts = self.options(timeout);
        self.proxies.with_proxy(|proxy| {
            http::get_prefix(
                url,
                &RequestOptions { proxy, ..opts.clone() },
                self.settings.prefix_bytes,
                INSPECT_LEN,
            )
        })
    }

    /// Signature check on a prefix read; `Some(total size)` when it is an archive.
    fn confirm(prefix: &PrefixResponse) -> Option<u64> {
        let status = prefix.headers.status;
        if (status == 200 || status == 206) && matches_signature(&prefix.leading) {
            Some(prefix.headers.total_size().unwrap_or(0))
        } else {
            None
        }
    }

    fn step(&self, url: &str, step: Step) -> Step {
        match step {
            Step::Start => match self.cheap_check(url) {
                Ok(head) if head.status == 200 => match self.read_prefix(url, self.settings.range_timeout) {
                    Ok(prefix) => match Self::confirm(&prefix) {
                        Some(range_size) => Step::Confirmed {
                            size: head.content_length.unwrap_or(range_size),
                            method: DetectionMethod::HeadGet,
                        },
                        None => Step::Rejected { soft_blocked: false },
                    },
                    Err(e) => Step::Failed {
                        soft_blocked: false,
                        error: e.to_string(),
                    },
                },
                Ok(head) if head.status == 403 => Step::SoftBlocked,
                Ok(head) => Step::Failed {
                    soft_blocked: false,
                    error: format!("HTTP {}", head.status),
                },
                Err(e) => Step::Failed {
                    soft_blocked: false,
                    error: e.to_string(),
                },
            },
            Step::SoftBlocked => {
                if !self.settings.soft_block_cooldown.is_zero() {
                    std::thread::sleep(self.settings.soft_block_cooldown);
                }
                match self.read_prefix(url, self.settings.soft_block_timeout) {
                    Ok(prefix) => match Self::confirm(&prefix) {
                        Some(size) => Step::Confirmed {
                            size,
                            method: DetectionMethod::GetRange,
                        },
                        None => Step::Rejected { soft_blocked: true },
                    },
                    Err(e) => Step::Failed {
                        soft_blocked: true,
                        error: e.to_string(),
                    },
                }
            }
            terminal => terminal,
        }
    }
}

impl CandidateProber for Prober {
    fn probe(&self, id: CandidateId) -> Verdict {
        let url = self.url_for(&id);
        self.settings.jitter.sleep();

        let mut state = Step::Start;
        loop {
            state = self.step(&url, state);
            match state {
                Step::Start => continue,
                Step::SoftBlocked => {
                    tracing::debug!(id = %id, "HEAD refused with 403; cooling down before ranged read");
                    continue;
                }
                Step::Confirmed { size, method } => {
                    tracing::info!(id = %id, size, method = %method, "candidate confirmed");
                    return Verdict::valid(id, url, size, method);
                }
                Step::Rejected { soft_blocked } => {
                    tracing::trace!(id = %id, "candidate rejected");
                    return Verdict::invalid(id, url, soft_blocked);
                }
                Step::Failed { soft_blocked, error } => {
                    tracing::debug!(id = %id, "probe failed: {}", error);
                    return Verdict::failed(id, url, soft_blocked, error);
                }
            }
        }
    }
}
