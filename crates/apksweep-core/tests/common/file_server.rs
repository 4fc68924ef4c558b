//! Minimal HTTP/1.1 file server for integration tests.
//!
//! Serves a fixed set of paths. HEAD answers with Content-Length, GET with a
//! Range header answers 206 with Content-Range, plain GET answers 200 with the
//! full body. Unknown paths are 404. Per-path switches simulate soft blocks
//! and server errors.
//!
//! The server also works as a forward proxy: requests with an absolute URI
//! (`GET http://any.host/app-0001.apk`) are served from the same paths and
//! counted as proxied.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

/// Body a valid archive starts with.
pub fn archive_body(len: usize) -> Vec<u8> {
    let mut body = b"PK\x03\x04".to_vec();
    body.extend((0u8..=250).cycle().take(len.saturating_sub(4)));
    body
}

#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub body: Vec<u8>,
    /// HEAD always answers 403.
    pub head_forbidden: bool,
    /// The first N full (non-range) GETs answer 403.
    pub forbid_full_gets: usize,
    /// The next N full GETs (after the 403s) answer 500.
    pub error_full_gets: usize,
}

impl Resource {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: usize,
    heads: HashMap<String, usize>,
    range_gets: HashMap<String, usize>,
    full_gets: HashMap<String, usize>,
    proxied: usize,
}

pub struct FileServer {
    base: String,
    counters: Arc<Mutex<Counters>>,
}

impl FileServer {
    /// Starts the server in a background thread; it runs until the process exits.
    pub fn start(resources: Vec<(&str, Resource)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let resources: HashMap<String, Resource> = resources
            .into_iter()
            .map(|(p, r)| (p.to_string(), r))
            .collect();
        let resources = Arc::new(Mutex::new(resources));
        let counters = Arc::new(Mutex::new(Counters::default()));
        let c = Arc::clone(&counters);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let resources = Arc::clone(&resources);
                let counters = Arc::clone(&c);
                thread::spawn(move || handle(stream, &resources, &counters));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}/", port),
            counters,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// `<base>app-%s.apk`
    pub fn url_template(&self) -> String {
        format!("{}app-%s.apk", self.base)
    }

    /// `host:port` for use as a forward proxy.
    pub fn proxy_endpoint(&self) -> String {
        self.base
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }

    /// Requests that arrived in absolute-URI (proxy) form.
    pub fn proxied_requests(&self) -> usize {
        self.counters.lock().unwrap().proxied
    }

    pub fn total_requests(&self) -> usize {
        self.counters.lock().unwrap().total
    }

    pub fn heads(&self, path: &str) -> usize {
        *self.counters.lock().unwrap().heads.get(path).unwrap_or(&0)
    }

    pub fn range_gets(&self, path: &str) -> usize {
        *self.counters.lock().unwrap().range_gets.get(path).unwrap_or(&0)
    }

    pub fn full_gets(&self, path: &str) -> usize {
        *self.counters.lock().unwrap().full_gets.get(path).unwrap_or(&0)
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    resources: &Mutex<HashMap<String, Resource>>,
    counters: &Mutex<Counters>,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, target, range) = parse_request(request);
    let (path, proxied) = origin_form(target);

    let resource = resources.lock().unwrap().get(&path).cloned();
    let is_head = method.eq_ignore_ascii_case("HEAD");
    let failure = {
        let mut c = counters.lock().unwrap();
        c.total += 1;
        if proxied {
            c.proxied += 1;
        }
        let counter = if is_head {
            &mut c.heads
        } else if range.is_some() {
            &mut c.range_gets
        } else {
            &mut c.full_gets
        };
        let seen = counter.entry(path.clone()).or_insert(0);
        *seen += 1;
        match &resource {
            Some(r) if !is_head && range.is_none() => {
                if *seen <= r.forbid_full_gets {
                    Some("403 Forbidden")
                } else if *seen <= r.forbid_full_gets.saturating_add(r.error_full_gets) {
                    Some("500 Internal Server Error")
                } else {
                    None
                }
            }
            _ => None,
        }
    };

    let Some(resource) = resource else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
        );
        return;
    };
    let body = &resource.body;
    let total = body.len() as u64;

    if is_head {
        let response = if resource.head_forbidden {
            "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        } else {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                total
            )
        };
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }
    if let Some(status) = failure {
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: 6\r\nConnection: close\r\n\r\nfailed",
            status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let (status, content_range, slice) = match range {
        Some((start, end_incl)) if total > 0 => {
            let start = start.min(total - 1) as usize;
            let end_excl = (end_incl.saturating_add(1)).min(total) as usize;
            let slice = body.get(start..end_excl).unwrap_or(&body[0..0]);
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, end_excl.saturating_sub(1), total)),
                slice,
            )
        }
        _ => ("200 OK", None, &body[..]),
    };
    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Strips `http://authority` from an absolute-URI request target.
/// Returns the path and whether the request came in proxy form.
fn origin_form(target: &str) -> (String, bool) {
    match target.strip_prefix("http://") {
        Some(rest) => {
            let path = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
            (path.to_string(), true)
        }
        None => (target.to_string(), false),
    }
}

/// Returns (method, request target, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut method = "";
    let mut path = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("");
            path = parts.next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if value.to_lowercase().starts_with("bytes=") {
                    if let Some((a, b)) = value[6..].trim().split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, path, range)
}
