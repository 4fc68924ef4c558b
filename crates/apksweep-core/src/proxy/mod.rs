//! Upstream proxy rotation.
//!
//! The rotator owns every proxy record. Workers share it through an `Arc`
//! and go through `acquire_proxy` / `record_use`; both take the same mutex,
//! so exactly one caller makes each rotation decision and no proxy is ever
//! leased more than `max_uses` times. The rotating caller marks the state
//! and drops the lock while it health-checks and fetches; other acquirers
//! wait on a condvar, `record_use` never waits.
//!
//! Selection walks the fetched candidate list, health-checks each entry and
//! adopts the first that passes. An exhausted list is re-fetched once; if the
//! fresh list yields nothing either, the rotator degrades to direct
//! connections for the rest of the run.

mod discovery;
mod health;

pub use discovery::{parse_proxy_list, HttpProxySource};
pub use health::{EchoHealthCheck, DEFAULT_HEALTH_URL};

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};

use anyhow::Result;

use crate::retry::TransferError;

/// Source of candidate proxy endpoints (a discovery service in production).
pub trait ProxySource: Send + Sync {
    fn fetch_candidates(&self) -> Result<Vec<String>>;
}

/// Cheap canary check run once per candidate before first use.
pub trait HealthCheck: Send + Sync {
    fn check(&self, endpoint: &str) -> bool;
}

/// The active proxy and its usage counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    pub endpoint: String,
    /// Requests actually sent through this proxy.
    pub uses_so_far: u32,
    /// Leases handed out but not yet recorded.
    in_flight: u32,
    generation: u64,
}

/// Permission to send one request through `endpoint`. Hand it back with
/// `record_use` once the request went out.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a proxy lease must be recorded"]
pub struct ProxyLease {
    endpoint: String,
    generation: u64,
}

impl ProxyLease {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Proxies configured; a record is adopted lazily on first acquire.
    Rotating,
    /// No proxy available (disabled or exhausted): direct connections only.
    Direct,
}

#[derive(Debug)]
struct RotatorState {
    mode: Mode,
    candidates: VecDeque<String>,
    active: Option<ProxyRecord>,
    retired: HashSet<String>,
    next_generation: u64,
    rotations: u32,
    /// A caller is selecting the next proxy outside the lock.
    rotating: bool,
}

/// Use-count-triggered proxy rotator. See the module docs.
pub struct ProxyRotator {
    max_uses: u32,
    source: Box<dyn ProxySource>,
    health: Box<dyn HealthCheck>,
    state: Mutex<RotatorState>,
    rotated: Condvar,
}

impl std::fmt::Debug for ProxyRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRotator")
            .field("max_uses", &self.max_uses)
            .field("state", &*self.lock())
            .finish()
    }
}

struct NoProxies;

impl ProxySource for NoProxies {
    fn fetch_candidates(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

impl HealthCheck for NoProxies {
    fn check(&self, _endpoint: &str) -> bool {
        false
    }
}

impl ProxyRotator {
    pub fn new(
        max_uses: u32,
        source: Box<dyn ProxySource>,
        health: Box<dyn HealthCheck>,
    ) -> Self {
        Self {
            max_uses: max_uses.max(1),
            source,
            health,
            state: Mutex::new(RotatorState {
                mode: Mode::Rotating,
                candidates: VecDeque::new(),
                active: None,
                retired: HashSet::new(),
                next_generation: 1,
                rotations: 0,
                rotating: false,
            }),
            rotated: Condvar::new(),
        }
    }

    /// A rotator that never hands out a proxy.
    pub fn direct() -> Self {
        let r = Self::new(1, Box::new(NoProxies), Box::new(NoProxies));
        r.lock().mode = Mode::Direct;
        r
    }

    pub fn max_uses(&self) -> u32 {
        self.max_uses
    }

    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Returns a lease on the current proxy, rotating first if the active
    /// proxy has no use slots left or none is active yet. `None` means go
    /// direct.
    ///
    /// Only one caller rotates at a time; concurrent acquirers wait for the
    /// new proxy instead of rotating past it.
    pub fn acquire_proxy(&self) -> Option<ProxyLease> {
        let mut st = self.lock();
        loop {
            if st.mode == Mode::Direct {
                return None;
            }
            if let Some(active) = st.active.as_mut() {
                if active.uses_so_far + active.in_flight < self.max_uses {
                    active.in_flight += 1;
                    return Some(ProxyLease {
                        endpoint: active.endpoint.clone(),
                        generation: active.generation,
                    });
                }
            }
            if !st.rotating {
                break;
            }
            st = self.rotated.wait(st).unwrap_or_else(|p| p.into_inner());
        }

        if let Some(old) = st.active.take() {
            tracing::info!(proxy = %old.endpoint, uses = old.uses_so_far, "retiring proxy after max uses");
            st.retired.insert(old.endpoint);
        }
        st.rotating = true;
        let mut selection = Selection {
            candidates: std::mem::take(&mut st.candidates),
            retired: st.retired.clone(),
        };
        drop(st);

        let picked = self.select_next(&mut selection);

        let mut st = self.lock();
        st.candidates = selection.candidates;
        st.retired.extend(selection.retired);
        st.rotating = false;
        let lease = match picked {
            Some(endpoint) => {
                let generation = st.next_generation;
                st.next_generation += 1;
                st.rotations += 1;
                tracing::info!(proxy = %endpoint, "switched to proxy");
                st.active = Some(ProxyRecord {
                    endpoint: endpoint.clone(),
                    uses_so_far: 0,
                    in_flight: 1,
                    generation,
                });
                Some(ProxyLease {
                    endpoint,
                    generation,
                })
            }
            None => {
                tracing::warn!("no working proxy available; continuing with direct connections");
                st.mode = Mode::Direct;
                None
            }
        };
        drop(st);
        self.rotated.notify_all();
        lease
    }

    /// Commits one request sent through the leased proxy. Leases on a proxy
    /// that has since been retired are accepted and ignored.
    pub fn record_use(&self, lease: ProxyLease) {
        let mut st = self.lock();
        if let Some(active) = st.active.as_mut() {
            if active.generation == lease.generation {
                active.in_flight = active.in_flight.saturating_sub(1);
                active.uses_so_far += 1;
            }
        }
    }

    /// Runs one request through the current proxy (or direct when none is
    /// available) and records the use afterwards. Failed requests count too:
    /// they were sent, and a dead proxy must still age out.
    pub fn with_proxy<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        F: FnOnce(Option<&str>) -> Result<T, TransferError>,
    {
        let lease = self.acquire_proxy();
        let res = f(lease.as_ref().map(ProxyLease::endpoint));
        if let Some(lease) = lease {
            if let Err(e) = &res {
                tracing::debug!(proxy = %lease.endpoint(), "request via proxy failed: {}", e);
            }
            self.record_use(lease);
        }
        res
    }

    /// Snapshot of the active proxy, if any.
    pub fn active(&self) -> Option<ProxyRecord> {
        self.lock().active.clone()
    }

    /// True once the rotator has given up on proxies (or was built direct).
    pub fn is_direct(&self) -> bool {
        self.lock().mode == Mode::Direct
    }

    /// Number of proxies adopted so far.
    pub fn rotations(&self) -> u32 {
        self.lock().rotations
    }

    fn select_next(&self, sel: &mut Selection) -> Option<String> {
        let mut fetched = false;
        loop {
            while let Some(candidate) = sel.candidates.pop_front() {
                if sel.retired.contains(&candidate) {
                    continue;
                }
                if self.health.check(&candidate) {
                    return Some(candidate);
                }
                tracing::warn!(proxy = %candidate, "proxy failed health check; skipping");
                sel.retired.insert(candidate);
            }
            if fetched {
                return None;
            }
            fetched = true;
            match self.source.fetch_candidates() {
                Ok(list) => {
                    tracing::info!(count = list.len(), "fetched proxy candidates");
                    sel.candidates = list.into_iter().collect();
                }
                Err(e) => {
                    tracing::warn!("proxy discovery failed: {:#}", e);
                }
            }
        }
    }
}

/// Working copy of the candidate list for one rotation, taken out of the
/// locked state so health checks run unlocked.
struct Selection {
    candidates: VecDeque<String>,
    retired: HashSet<String>,
}
