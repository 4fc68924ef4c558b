//! Blocking HTTP requests on top of libcurl.
//!
//! Three request shapes cover both phases: a HEAD existence check, a ranged
//! GET that captures only the first bytes of the body, and a full streamed GET
//! handed to a sink. All of them follow redirects, send the rotating identity
//! and browser headers, and optionally go through an upstream proxy.
//! Non-2xx statuses are returned to the caller, not turned into errors; only
//! transport failures are `Err`.
//! Runs in the current thread; call from `spawn_blocking` if used from async code.

mod parse;

pub use parse::ResponseHeaders;

use std::cell::RefCell;
use std::str;
use std::time::Duration;

use crate::retry::TransferError;

/// Per-request settings chosen by the caller for one attempt.
#[derive(Debug, Clone)]
pub struct RequestOptions<'a> {
    pub user_agent: &'a str,
    pub headers: &'a [(String, String)],
    /// Upstream proxy endpoint (`host:port` or `scheme://host:port`).
    pub proxy: Option<&'a str>,
    pub connect_timeout: Duration,
    /// Hard wall-clock limit for the whole transfer.
    pub timeout: Duration,
}

/// Outcome of a ranged prefix read.
#[derive(Debug, Clone)]
pub struct PrefixResponse {
    pub headers: ResponseHeaders,
    /// Leading body bytes (at most the requested inspect length).
    pub leading: Vec<u8>,
}

/// Outcome of a streamed GET.
#[derive(Debug, Clone)]
pub struct StreamResponse {
    pub headers: ResponseHeaders,
    /// Body bytes handed to the sink (only counted for 200 responses).
    pub bytes: u64,
}

fn easy_for(url: &str, opts: &RequestOptions<'_>) -> Result<curl::easy::Easy, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(opts.connect_timeout.min(opts.timeout))?;
    easy.timeout(opts.timeout)?;
    easy.useragent(opts.user_agent)?;
    // Explicit in both directions so http_proxy/no_proxy from the
    // environment never reroute a request.
    easy.proxy(opts.proxy.unwrap_or(""))?;
    easy.noproxy("")?;

    let mut list = curl::easy::List::new();
    for (k, v) in opts.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !opts.headers.is_empty() {
        easy.http_headers(list)?;
    }
    Ok(easy)
}

/// Performs a HEAD request and returns the final status and headers.
pub fn head(url: &str, opts: &RequestOptions<'_>) -> Result<ResponseHeaders, TransferError> {
    let headers = RefCell::new(ResponseHeaders::default());
    let mut easy = easy_for(url, opts)?;
    easy.nobody(true)?;
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.borrow_mut().feed(s);
            }
            true
        })?;
        transfer.perform()?;
    }
    let mut headers = headers.into_inner();
    headers.status = easy.response_code()?;
    Ok(headers)
}

/// GET with `Range: bytes=0-(range_len-1)`, keeping at most `inspect_len`
/// leading bytes. Servers that ignore the range and stream the whole body
/// are cut off once enough bytes were captured.
pub fn get_prefix(
    url: &str,
    opts: &RequestOptions<'_>,
    range_len: u64,
    inspect_len: usize,
) -> Result<PrefixResponse, TransferError> {
    let headers = RefCell::new(ResponseHeaders::default());
    let leading = RefCell::new(Vec::with_capacity(inspect_len));
    let mut easy = easy_for(url, opts)?;
    easy.range(&format!("0-{}", range_len.saturating_sub(1)))?;
    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.borrow_mut().feed(s);
            }
            true
        })?;
        transfer.write_function(|data| {
            let mut buf = leading.borrow_mut();
            let want = inspect_len.saturating_sub(buf.len());
            buf.extend_from_slice(&data[..want.min(data.len())]);
            if buf.len() >= inspect_len {
                // Enough bytes; abort the rest of the body.
                return Ok(0);
            }
            Ok(data.len())
        })?;
        transfer.perform()
    };
    let leading = leading.into_inner();
    if let Err(e) = perform_result {
        // A write abort after capturing the prefix is the expected early stop.
        if !(e.is_write_error() && leading.len() >= inspect_len) {
            return Err(TransferError::Curl(e));
        }
    }
    let mut headers = headers.into_inner();
    if let Ok(code) = easy.response_code() {
        if code != 0 {
            headers.status = code;
        }
    }
    Ok(PrefixResponse { headers, leading })
}

/// Full GET streaming the body of a 200 response into `sink`. Bodies of other
/// statuses (error pages) are drained and discarded. `on_headers` is called
/// once with the final response headers, before the first body chunk.
pub fn stream_get<S, H>(
    url: &str,
    opts: &RequestOptions<'_>,
    mut sink: S,
    mut on_headers: H,
) -> Result<StreamResponse, TransferError>
where
    S: FnMut(&[u8]) -> std::io::Result<()>,
    H: FnMut(&ResponseHeaders),
{
    let headers = RefCell::new(ResponseHeaders::default());
    let written = RefCell::new(0u64);
    let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);
    let mut announced = false;
    let mut easy = easy_for(url, opts)?;
    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.borrow_mut().feed(s);
            }
            true
        })?;
        transfer.write_function(|data| {
            let h = headers.borrow();
            if !announced {
                on_headers(&h);
                announced = true;
            }
            if h.status != 200 {
                return Ok(data.len());
            }
            match sink(data) {
                Ok(()) => {
                    *written.borrow_mut() += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    storage_error.borrow_mut().replace(e);
                    Ok(0) // abort transfer
                }
            }
        })?;
        transfer.perform()
    };
    if let Err(e) = perform_result {
        if e.is_write_error() {
            if let Some(io_err) = storage_error.into_inner() {
                return Err(TransferError::Storage(io_err));
            }
        }
        return Err(TransferError::Curl(e));
    }
    let mut headers = headers.into_inner();
    headers.status = easy.response_code()?;
    Ok(StreamResponse {
        headers,
        bytes: written.into_inner(),
    })
}
