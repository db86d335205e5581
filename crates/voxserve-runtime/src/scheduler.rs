//! GPU admission scheduling.
//!
//! The scheduler is the single shared-mutation point for capacity
//! accounting. Every synthesis request must hold an [`AdmissionTicket`]
//! for the duration of its device work; releasing a ticket is
//! idempotent and happens on drop at the latest, so the failure path
//! can never leak capacity.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};
use voxserve_core::{SchedulerConfig, SynthError, SynthResult};

/// Shared acquire/release counters, exposed through [`SchedulerSnapshot`].
#[derive(Debug, Default)]
struct SchedulerStats {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Gates concurrent synthesis work against a fixed capacity budget.
#[derive(Debug)]
pub struct AdmissionScheduler {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    max_waiting: usize,
    wait_timeout: Duration,
    waiting: AtomicUsize,
    stats: Arc<SchedulerStats>,
}

impl AdmissionScheduler {
    /// Create a scheduler from configuration.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            capacity: config.max_concurrent,
            max_waiting: config.max_waiting,
            wait_timeout: Duration::from_millis(config.admission_timeout_ms),
            waiting: AtomicUsize::new(0),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    /// Total capacity in cost units.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently available capacity.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a ticket for `cost` units of capacity.
    ///
    /// Admits immediately when capacity is free. Otherwise the request
    /// joins a bounded wait queue; if the queue is full or the wait
    /// exceeds the configured timeout, fails with `Overloaded`.
    pub async fn acquire(&self, cost: u32) -> SynthResult<AdmissionTicket> {
        if cost == 0 || cost as usize > self.capacity {
            return Err(SynthError::Overloaded(format!(
                "requested cost {} exceeds total capacity {}",
                cost, self.capacity
            )));
        }

        // Fast path: no waiting.
        if let Ok(permit) = self.semaphore.clone().try_acquire_many_owned(cost) {
            return Ok(self.issue(permit, cost));
        }

        // Bounded wait queue with timeout.
        let queued = self.waiting.fetch_add(1, Ordering::SeqCst);
        if queued >= self.max_waiting {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            warn!(cost, waiting = queued, "admission rejected, wait queue full");
            return Err(SynthError::Overloaded("wait queue full".to_string()));
        }

        let acquired = tokio::time::timeout(
            self.wait_timeout,
            self.semaphore.clone().acquire_many_owned(cost),
        )
        .await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        match acquired {
            Ok(Ok(permit)) => Ok(self.issue(permit, cost)),
            // The semaphore is never closed while the scheduler lives.
            Ok(Err(_)) => Err(SynthError::internal("admission semaphore closed")),
            Err(_) => {
                warn!(cost, "admission wait timed out");
                Err(SynthError::Overloaded(format!(
                    "no capacity within {:?}",
                    self.wait_timeout
                )))
            }
        }
    }

    fn issue(&self, permit: OwnedSemaphorePermit, cost: u32) -> AdmissionTicket {
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(cost, available = self.available(), "admission ticket issued");
        AdmissionTicket {
            permit: Some(permit),
            cost,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Point-in-time view of scheduler state.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            capacity: self.capacity,
            available: self.available(),
            waiting: self.waiting.load(Ordering::SeqCst),
            acquired: self.stats.acquired.load(Ordering::SeqCst),
            released: self.stats.released.load(Ordering::SeqCst),
        }
    }
}

/// Scheduler state for health reporting and leak checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    /// Total capacity.
    pub capacity: usize,
    /// Free capacity.
    pub available: usize,
    /// Requests currently waiting for a slot.
    pub waiting: usize,
    /// Tickets issued since start.
    pub acquired: u64,
    /// Tickets released since start.
    pub released: u64,
}

/// A scoped lease on scheduler capacity.
///
/// Capacity returns when [`release`](AdmissionTicket::release) is
/// called or the ticket is dropped, whichever happens first.
#[derive(Debug)]
pub struct AdmissionTicket {
    permit: Option<OwnedSemaphorePermit>,
    cost: u32,
    stats: Arc<SchedulerStats>,
}

impl AdmissionTicket {
    /// Cost units held by this ticket.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Return the held capacity. Idempotent.
    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max_concurrent: usize, max_waiting: usize, timeout_ms: u64) -> AdmissionScheduler {
        AdmissionScheduler::new(&SchedulerConfig {
            max_concurrent,
            max_waiting,
            admission_timeout_ms: timeout_ms,
        })
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let sched = scheduler(2, 4, 100);
        assert_eq!(sched.available(), 2);

        let ticket = sched.acquire(1).await.unwrap();
        assert_eq!(sched.available(), 1);

        drop(ticket);
        assert_eq!(sched.available(), 2);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let sched = scheduler(1, 4, 100);
        let mut ticket = sched.acquire(1).await.unwrap();
        ticket.release();
        ticket.release();
        drop(ticket);

        assert_eq!(sched.available(), 1);
        let snap = sched.snapshot();
        assert_eq!(snap.acquired, 1);
        assert_eq!(snap.released, 1);
    }

    #[tokio::test]
    async fn test_oversized_cost_is_rejected() {
        let sched = scheduler(2, 4, 100);
        let err = sched.acquire(3).await.unwrap_err();
        assert_eq!(err.code(), "Overloaded");
    }

    #[tokio::test]
    async fn test_timeout_when_exhausted() {
        let sched = scheduler(1, 4, 50);
        let _held = sched.acquire(1).await.unwrap();

        let err = sched.acquire(1).await.unwrap_err();
        assert_eq!(err.code(), "Overloaded");
    }

    #[tokio::test]
    async fn test_wait_queue_bound() {
        let sched = Arc::new(scheduler(1, 0, 1_000));
        let _held = sched.acquire(1).await.unwrap();

        // With a zero-length wait queue, a blocked request fails fast.
        let err = sched.acquire(1).await.unwrap_err();
        assert_eq!(err.code(), "Overloaded");
    }

    #[tokio::test]
    async fn test_no_leak_at_quiescence() {
        let sched = Arc::new(scheduler(2, 8, 1_000));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let sched = Arc::clone(&sched);
            handles.push(tokio::spawn(async move {
                let _ticket = sched.acquire(1).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = sched.snapshot();
        assert_eq!(snap.acquired, snap.released);
        assert_eq!(snap.available, snap.capacity);
        assert_eq!(snap.waiting, 0);
    }

    #[tokio::test]
    async fn test_waiter_admitted_after_release() {
        let sched = Arc::new(scheduler(1, 4, 1_000));
        let held = sched.acquire(1).await.unwrap();

        let waiter = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.acquire(1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let ticket = waiter.await.unwrap().unwrap();
        assert_eq!(ticket.cost(), 1);
    }
}
