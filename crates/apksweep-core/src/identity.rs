//! Client identity rotation.
//!
//! Every request attempt, retries included, draws a user-agent from a fixed
//! pool of realistic browser strings, and carries the same browser-like
//! header set so requests look like a person clicking a download link.

use rand::seq::SliceRandom;

/// Browser user-agent strings the rotator chooses from.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Uniform random selection over a fixed identity pool. Read-only after
/// construction, so one instance can be shared by every worker.
#[derive(Debug, Clone)]
pub struct IdentityRotator {
    pool: Vec<String>,
    base_headers: Vec<(String, String)>,
}

impl Default for IdentityRotator {
    fn default() -> Self {
        Self::new(USER_AGENTS.iter().map(|s| s.to_string()).collect(), None)
    }
}

impl IdentityRotator {
    /// `origin` (e.g. `http://files.example.com`) fills Referer and Origin.
    /// An empty pool falls back to the built-in user agents.
    pub fn new(pool: Vec<String>, origin: Option<&str>) -> Self {
        let pool = if pool.is_empty() {
            USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            pool
        };
        Self {
            pool,
            base_headers: browser_headers(origin),
        }
    }

    pub fn with_origin(origin: Option<&str>) -> Self {
        Self::new(Vec::new(), origin)
    }

    pub fn next_identity(&self) -> &str {
        self.pool
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(USER_AGENTS[0])
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    /// Headers sent with every request besides User-Agent.
    pub fn headers(&self) -> &[(String, String)] {
        &self.base_headers
    }
}

fn browser_headers(origin: Option<&str>) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
        ("Accept-Encoding", "identity"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Cache-Control", "max-age=0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    if let Some(origin) = origin {
        headers.push(("Referer".to_string(), format!("{}/", origin.trim_end_matches('/'))));
        headers.push(("Origin".to_string(), origin.trim_end_matches('/').to_string()));
    }
    headers
}
