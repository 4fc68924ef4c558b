//! Randomised delays inserted before requests and after soft blocks.

use rand::Rng;
use std::time::Duration;

/// Inclusive range of delays; each call to `sample` draws uniformly from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    pub fn from_secs(min_secs: u64, max_secs: u64) -> Self {
        Self::new(Duration::from_secs(min_secs), Duration::from_secs(max_secs))
    }

    /// Fixed delay (min == max).
    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Blocks the current thread for a sampled delay. Returns the delay used.
    pub fn sleep(&self) -> Duration {
        let d = self.sample();
        if !d.is_zero() {
            std::thread::sleep(d);
        }
        d
    }
}
