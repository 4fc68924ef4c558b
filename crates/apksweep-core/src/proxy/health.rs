//! Canary request used to decide whether a proxy actually forwards traffic.

use std::time::Duration;

use crate::http::{self, RequestOptions};
use crate::identity::USER_AGENTS;

use super::HealthCheck;

/// Default echo-IP service for canary requests.
pub const DEFAULT_HEALTH_URL: &str = "http://httpbin.org/ip";

/// GETs an echo-IP endpoint through the candidate proxy; any 200 passes.
#[derive(Debug, Clone)]
pub struct EchoHealthCheck {
    pub url: String,
    pub timeout: Duration,
}

impl EchoHealthCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl Default for EchoHealthCheck {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_URL, Duration::from_secs(5))
    }
}

impl HealthCheck for EchoHealthCheck {
    fn check(&self, endpoint: &str) -> bool {
        let opts = RequestOptions {
            user_agent: USER_AGENTS[0],
            headers: &[],
            proxy: Some(endpoint),
            connect_timeout: self.timeout,
            timeout: self.timeout,
        };
        match http::stream_get(&self.url, &opts, |_| Ok(()), |_| {}) {
            Ok(resp) if resp.headers.status == 200 => true,
            Ok(resp) => {
                tracing::debug!(proxy = endpoint, status = resp.headers.status, "proxy health check rejected");
                false
            }
            Err(e) => {
                tracing::debug!(proxy = endpoint, "proxy health check failed: {}", e);
                false
            }
        }
    }
}
