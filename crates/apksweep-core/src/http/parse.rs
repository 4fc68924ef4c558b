//! Incremental parsing of HTTP response header lines.

/// Headers of the final response (after redirects) that the prober and
/// fetcher care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    /// Status from the most recent status line (0 until one is seen).
    pub status: u32,
    /// `Content-Length`, if present.
    pub content_length: Option<u64>,
    /// Total size from `Content-Range: bytes a-b/TOTAL` (None for `*`).
    pub content_range_total: Option<u64>,
}

impl ResponseHeaders {
    /// Feed one raw header line. A new status line (redirect hop, or the
    /// `100 Continue` preamble) resets previously seen fields.
    pub(crate) fn feed(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            *self = ResponseHeaders {
                status: parse_status_line(line).unwrap_or(0),
                ..Default::default()
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    self.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("content-range") {
                self.content_range_total = parse_content_range_total(value);
            }
        }
    }

    /// Best known size of the whole resource: the Content-Range total when
    /// the response was partial, otherwise Content-Length.
    pub fn total_size(&self) -> Option<u64> {
        if self.status == 206 {
            self.content_range_total.or(self.content_length)
        } else {
            self.content_length.or(self.content_range_total)
        }
    }
}

fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// `bytes 0-1023/2048` -> Some(2048); `bytes */2048` -> Some(2048); `bytes 0-1/*` -> None.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}
