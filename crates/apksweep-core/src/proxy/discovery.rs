//! Proxy discovery: fetch a candidate list from a third-party endpoint and
//! normalise whatever shape it comes back in.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::http::{self, RequestOptions};
use crate::identity::USER_AGENTS;

use super::ProxySource;

/// Upper bound on a discovery payload; anything larger is not a proxy list.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Keys that wrap the list in object-shaped payloads, in lookup order.
const WRAPPER_KEYS: &[&str] = &["data", "proxies", "proxy"];

/// Fetches the candidate list with a plain GET against a discovery URL.
#[derive(Debug, Clone)]
pub struct HttpProxySource {
    pub url: String,
    pub timeout: Duration,
}

impl HttpProxySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl ProxySource for HttpProxySource {
    fn fetch_candidates(&self) -> Result<Vec<String>> {
        let opts = RequestOptions {
            user_agent: USER_AGENTS[0],
            headers: &[],
            proxy: None,
            connect_timeout: self.timeout,
            timeout: self.timeout,
        };
        let mut body = Vec::new();
        let resp = http::stream_get(
            &self.url,
            &opts,
            |chunk| {
                if body.len() + chunk.len() > MAX_BODY_BYTES {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "proxy list too large",
                    ));
                }
                body.extend_from_slice(chunk);
                Ok(())
            },
            |_| {},
        )
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("proxy discovery request to {} failed", self.url))?;
        if resp.headers.status != 200 {
            anyhow::bail!("proxy discovery {} returned HTTP {}", self.url, resp.headers.status);
        }
        let text = String::from_utf8_lossy(&body);
        Ok(parse_proxy_list(&text))
    }
}

/// Extract proxy endpoints from a discovery payload.
///
/// Accepts a JSON array, `{data:[...]}`, `{proxies:[...]}`, `{proxy:...}`,
/// array items that are strings or `{ip|host, port}` objects, and a plain
/// newline-separated list. Empty entries and duplicates are dropped.
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    let raw = match serde_json::from_str::<Value>(body) {
        Ok(v) => collect_entries(&v),
        Err(_) => body.lines().map(str::to_string).collect(),
    };
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() || out.iter().any(|e| e == entry) {
            continue;
        }
        out.push(entry.to_string());
    }
    out
}

fn collect_entries(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().filter_map(entry_from_value).collect(),
        Value::Object(map) => {
            for key in WRAPPER_KEYS {
                if let Some(inner) = map.get(*key) {
                    return collect_entries(inner);
                }
            }
            entry_from_value(v).into_iter().collect()
        }
        other => entry_from_value(other).into_iter().collect(),
    }
}

fn entry_from_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("proxy") {
                return Some(s.clone());
            }
            let host = map
                .get("ip")
                .or_else(|| map.get("host"))
                .and_then(Value::as_str)?;
            let port = match map.get("port")? {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            let scheme = map
                .get("protocol")
                .or_else(|| map.get("type"))
                .and_then(Value::as_str)
                .filter(|p| matches!(*p, "http" | "https" | "socks4" | "socks5"));
            Some(match scheme {
                Some(s) => format!("{s}://{host}:{port}"),
                None => format!("{host}:{port}"),
            })
        }
        _ => None,
    }
}
