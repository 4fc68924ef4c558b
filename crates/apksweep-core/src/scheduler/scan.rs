//! Probe phase: every candidate through a bounded worker pool.
//!
//! Workers are OS threads pulling from a shared queue; verdicts come back
//! over a channel in completion order. The scan is exhaustive: no early exit,
//! no cancellation, and one failed candidate never stops the rest.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::probe::{CandidateProber, Verdict};
use crate::target::CandidateId;

use super::governor::ConcurrencyGovernor;
use super::progress::{emit, EventSender, PipelineEvent, ScanProgress};

/// How long a worker above the adaptive limit waits before checking again.
const PARK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub workers: usize,
    /// Progress event every N completions (0 disables intermediate events).
    pub progress_every: usize,
    pub governor: Option<Arc<ConcurrencyGovernor>>,
}

impl ScanOptions {
    pub fn fixed(workers: usize) -> Self {
        Self {
            workers,
            progress_every: 0,
            governor: None,
        }
    }
}

/// All verdicts of one scan, in completion order.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub verdicts: Vec<Verdict>,
    pub elapsed: Duration,
}

impl ScanReport {
    /// The confirmed set: valid verdicts in completion order.
    pub fn confirmed(&self) -> Vec<Verdict> {
        self.verdicts.iter().filter(|v| v.valid).cloned().collect()
    }

    pub fn soft_blocked(&self) -> usize {
        self.verdicts.iter().filter(|v| v.soft_blocked).count()
    }
}

fn next_candidate(work: &Mutex<VecDeque<CandidateId>>) -> Option<CandidateId> {
    work.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
}

fn queue_is_empty(work: &Mutex<VecDeque<CandidateId>>) -> bool {
    work.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
}

/// Probes every id with at most `opts.workers` probes in flight.
pub fn scan(
    prober: Arc<dyn CandidateProber>,
    ids: Vec<CandidateId>,
    opts: &ScanOptions,
    events: Option<&EventSender>,
) -> ScanReport {
    let started = Instant::now();
    let total = ids.len();
    let num_workers = opts.workers.max(1).min(total.max(1));
    emit(
        events,
        PipelineEvent::ScanStarted {
            total,
            workers: num_workers,
        },
    );
    tracing::info!(total, workers = num_workers, "scan started");

    let work: Arc<Mutex<VecDeque<CandidateId>>> = Arc::new(Mutex::new(ids.into_iter().collect()));
    let (tx, rx) = mpsc::channel::<Verdict>();
    let mut handles = Vec::with_capacity(num_workers);
    for index in 0..num_workers {
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let prober = Arc::clone(&prober);
        let governor = opts.governor.clone();
        handles.push(std::thread::spawn(move || loop {
            if let Some(g) = &governor {
                if !g.allows(index) {
                    if queue_is_empty(&work) {
                        break;
                    }
                    std::thread::sleep(PARK_INTERVAL);
                    continue;
                }
            }
            let Some(id) = next_candidate(&work) else {
                break;
            };
            let verdict = prober.probe(id);
            if let Some(g) = &governor {
                g.record(verdict.soft_blocked);
            }
            if tx.send(verdict).is_err() {
                break;
            }
        }));
    }
    drop(tx);

    let mut verdicts = Vec::with_capacity(total);
    let mut found = 0usize;
    let active = |governor: &Option<Arc<ConcurrencyGovernor>>| {
        governor
            .as_ref()
            .map(|g| g.limit().min(num_workers))
            .unwrap_or(num_workers)
    };
    for verdict in rx {
        if verdict.valid {
            found += 1;
            emit(events, PipelineEvent::Found(verdict.clone()));
        }
        verdicts.push(verdict);
        let completed = verdicts.len();
        if opts.progress_every > 0 && completed % opts.progress_every == 0 && completed < total {
            emit(
                events,
                PipelineEvent::Scan(ScanProgress {
                    completed,
                    total,
                    found,
                    active_workers: active(&opts.governor),
                }),
            );
        }
    }
    for h in handles {
        if h.join().is_err() {
            tracing::error!("probe worker panicked");
        }
    }

    let elapsed = started.elapsed();
    emit(
        events,
        PipelineEvent::Scan(ScanProgress {
            completed: verdicts.len(),
            total,
            found,
            active_workers: active(&opts.governor),
        }),
    );
    emit(
        events,
        PipelineEvent::ScanFinished {
            scanned: verdicts.len(),
            found,
            elapsed_secs: elapsed.as_secs_f64(),
        },
    );
    tracing::info!(scanned = verdicts.len(), found, elapsed_ms = elapsed.as_millis() as u64, "scan finished");
    ScanReport { verdicts, elapsed }
}
