//! Bounded persistence queue
//!
//! The socket read loop hands writes to this queue and moves on. Workers
//! drain it through the [`CandlePublisher`]. When full, the oldest job is
//! evicted: a lost closed-candle write is repaired by backfill and boundary
//! fetches, while a stalled read loop would trip the watchdog.

use candela_core::{Ticker, UnifiedCandle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::presentation::CandlePublisher;

/// Minimum spacing between overflow warnings
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// One unit of deferred work
#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    /// Versioned write of an in-progress or finalized candle
    Candle(UnifiedCandle),
    /// Versioned write followed by a publish on every output channel
    CandleClosed(UnifiedCandle),
    Ticker(Ticker),
}

struct QueueInner {
    jobs: Mutex<VecDeque<PersistJob>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    in_flight: AtomicUsize,
    closed: AtomicBool,
    last_warning: Mutex<Option<Instant>>,
}

/// Bounded drop-oldest job queue shared by the session task and workers
#[derive(Clone)]
pub struct PersistQueue {
    inner: Arc<QueueInner>,
}

impl PersistQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PersistQueue {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                capacity,
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                last_warning: Mutex::new(None),
            }),
        }
    }

    /// Enqueue without waiting. Returns false if an older job was evicted.
    pub fn push(&self, job: PersistJob) -> bool {
        let evicted = {
            let mut jobs = self.inner.jobs.lock();
            let evicted = if jobs.len() >= self.inner.capacity {
                jobs.pop_front()
            } else {
                None
            };
            jobs.push_back(job);
            evicted
        };
        self.inner.notify.notify_one();

        if evicted.is_some() {
            let total = self.inner.dropped.fetch_add(1, Ordering::SeqCst) + 1;
            self.warn_dropped(total);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Jobs evicted since creation
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Start `count` workers writing through `publisher`
    pub fn spawn_workers(&self, count: usize, publisher: Arc<CandlePublisher>) -> Vec<JoinHandle<()>> {
        (0..count.max(1))
            .map(|id| {
                let queue = self.clone();
                let publisher = Arc::clone(&publisher);
                tokio::spawn(async move { queue.run_worker(id, publisher).await })
            })
            .collect()
    }

    /// Workers exit once the queue is empty
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Wait until every queued job has been processed. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_empty() && self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn pop(&self) -> Option<PersistJob> {
        let mut jobs = self.inner.jobs.lock();
        let job = jobs.pop_front();
        if job.is_some() {
            self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        job
    }

    async fn run_worker(&self, id: usize, publisher: Arc<CandlePublisher>) {
        debug!(worker = id, "persist worker started");
        loop {
            // Register before checking so a concurrent push or close is not missed
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.pop() {
                publisher.process(job).await;
                self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }
        debug!(worker = id, "persist worker stopped");
    }

    fn warn_dropped(&self, total: u64) {
        let mut last = self.inner.last_warning.lock();
        let now = Instant::now();
        if last.is_none_or(|t| now.duration_since(t) >= DROP_WARN_INTERVAL) {
            *last = Some(now);
            warn!(
                dropped_total = total,
                capacity = self.inner.capacity,
                "persistence queue full, dropping oldest jobs"
            );
        }
    }
}
