//! Adaptive worker limit for the probe phase.
//!
//! Soft blocks (403 on the cheap check) are the host telling us to slow down.
//! The governor keeps a sliding window of recent outcomes: when the blocked
//! share crosses the threshold the limit halves, and after a full clean
//! window it steps back up by one.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Outcomes remembered per decision.
pub const DEFAULT_WINDOW: usize = 20;
/// Blocked share of the window that triggers a step down.
pub const DEFAULT_BLOCK_RATIO: f64 = 0.25;

#[derive(Debug)]
struct GovernorState {
    limit: usize,
    window: VecDeque<bool>,
}

#[derive(Debug)]
pub struct ConcurrencyGovernor {
    max: usize,
    window_len: usize,
    block_ratio: f64,
    state: Mutex<GovernorState>,
}

impl ConcurrencyGovernor {
    pub fn new(max: usize) -> Self {
        Self::with_window(max, DEFAULT_WINDOW, DEFAULT_BLOCK_RATIO)
    }

    pub fn with_window(max: usize, window_len: usize, block_ratio: f64) -> Self {
        let max = max.max(1);
        let window_len = window_len.max(1);
        Self {
            max,
            window_len,
            block_ratio,
            state: Mutex::new(GovernorState {
                limit: max,
                window: VecDeque::with_capacity(window_len),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Workers with an index below this may pull work.
    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    pub fn allows(&self, worker_index: usize) -> bool {
        worker_index < self.limit()
    }

    /// Records one probe outcome and returns the (possibly new) limit.
    pub fn record(&self, soft_blocked: bool) -> usize {
        let mut st = self.lock();
        st.window.push_back(soft_blocked);
        if st.window.len() < self.window_len {
            return st.limit;
        }
        let blocked = st.window.iter().filter(|b| **b).count();
        let ratio = blocked as f64 / st.window.len() as f64;
        if ratio > self.block_ratio && st.limit > 1 {
            let next = (st.limit / 2).max(1);
            tracing::warn!(blocked, from = st.limit, to = next, "soft blocks piling up; reducing workers");
            st.limit = next;
            st.window.clear();
        } else if blocked == 0 && st.limit < self.max {
            st.limit += 1;
            tracing::info!(to = st.limit, "clean window; adding a worker");
            st.window.clear();
        } else {
            st.window.pop_front();
        }
        st.limit
    }
}
