//! Deadline Scheduler
//!
//! One sweeping task per agent drains a min-heap of deadline checks. Checks are
//! never cancelled: a check whose admission was already verified still fires,
//! and the handler's guard turns it into a no-op.

use crate::types::AdmissionKey;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Receives deadline checks as they come due.
#[async_trait]
pub trait DeadlineHandler: Send + Sync {
    async fn on_deadline(&self, key: AdmissionKey);
}

/// A scheduled deadline check
#[derive(Debug, Clone, Copy)]
struct ScheduledCheck {
    key: AdmissionKey,
    fire_at: Instant,
    /// Insertion order; breaks ties between checks due at the same instant
    seq: u64,
}

impl PartialEq for ScheduledCheck {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for ScheduledCheck {}

impl Ord for ScheduledCheck {
    /// BinaryHeap is a max-heap, so the earliest check must compare as Greater
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledCheck {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Checks waiting in the heap
    pub pending: usize,
    /// Checks accepted since start
    pub scheduled: u64,
    /// Checks handed to the handler
    pub fired: u64,
}

/// Centralized deadline scheduler
pub struct DeadlineScheduler {
    heap: Arc<Mutex<BinaryHeap<ScheduledCheck>>>,
    /// Wakes the sweeper when an earlier check is scheduled or on stop
    notify: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<SchedulerStats>>,
    next_seq: Mutex<u64>,
    idle_poll: Duration,
}

impl DeadlineScheduler {
    pub fn new() -> Self {
        Self {
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            notify: Arc::new(Notify::new()),
            worker: Mutex::new(None),
            running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            next_seq: Mutex::new(0),
            idle_poll: Duration::from_millis(500),
        }
    }

    /// Schedule a check for `key` at `fire_at`
    pub fn schedule_at(&self, key: AdmissionKey, fire_at: Instant) {
        let seq = {
            let mut next = self.next_seq.lock();
            *next += 1;
            *next
        };
        let is_earliest = {
            let mut heap = self.heap.lock();
            let earliest = heap.peek().map(|c| fire_at < c.fire_at).unwrap_or(true);
            heap.push(ScheduledCheck { key, fire_at, seq });
            earliest
        };
        {
            let mut stats = self.stats.write();
            stats.pending += 1;
            stats.scheduled += 1;
        }
        if is_earliest {
            self.notify.notify_one();
        }
        debug!(key = %key, "Scheduled deadline check");
    }

    /// Schedule a check for `key` after `delay`
    pub fn schedule_in(&self, key: AdmissionKey, delay: Duration) {
        self.schedule_at(key, Instant::now() + delay);
    }

    /// Start the sweeping task; a second call is a no-op
    pub fn start(&self, handler: Arc<dyn DeadlineHandler>) {
        {
            let mut running = self.running.write();
            if *running {
                return;
            }
            *running = true;
        }

        let heap = Arc::clone(&self.heap);
        let notify = Arc::clone(&self.notify);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let idle_poll = self.idle_poll;

        let handle = tokio::spawn(async move {
            Self::sweep_loop(heap, notify, running, stats, handler, idle_poll).await;
        });
        *self.worker.lock() = Some(handle);

        info!("Deadline scheduler started");
    }

    /// Stop the sweeping task. Checks still in the heap are dropped.
    pub async fn stop(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }
        self.notify.notify_one();

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!(error = %e, "Deadline scheduler task ended abnormally");
            }
        }
        info!("Deadline scheduler stopped");
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.read().clone()
    }

    async fn sweep_loop(
        heap: Arc<Mutex<BinaryHeap<ScheduledCheck>>>,
        notify: Arc<Notify>,
        running: Arc<RwLock<bool>>,
        stats: Arc<RwLock<SchedulerStats>>,
        handler: Arc<dyn DeadlineHandler>,
        idle_poll: Duration,
    ) {
        debug!("Deadline sweeper started");

        while *running.read() {
            let now = Instant::now();
            let (due, next_fire) = {
                let mut heap = heap.lock();
                let mut due = Vec::new();
                while heap.peek().map(|c| c.fire_at <= now).unwrap_or(false) {
                    if let Some(check) = heap.pop() {
                        due.push(check);
                    }
                }
                (due, heap.peek().map(|c| c.fire_at))
            };

            if !due.is_empty() {
                {
                    let mut stats = stats.write();
                    stats.pending = stats.pending.saturating_sub(due.len());
                    stats.fired += due.len() as u64;
                }
                // Each check runs as its own task, like any other event
                for check in due {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.on_deadline(check.key).await;
                    });
                }
                continue;
            }

            match next_fire {
                Some(fire_at) => {
                    tokio::select! {
                        _ = notify.notified() => {}
                        _ = sleep_until(fire_at) => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = notify.notified() => {}
                        _ = sleep(idle_poll) => {}
                    }
                }
            }
        }

        debug!("Deadline sweeper stopped");
    }
}

impl Default for DeadlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}
