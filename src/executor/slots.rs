use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded pool of render concurrency units.
///
/// Acquisition never blocks; callers that get `None` queue the work instead.
#[derive(Clone, Debug)]
pub struct WorkerSlots {
    inner: Arc<SlotsInner>,
}

#[derive(Debug)]
struct SlotsInner {
    capacity: usize,
    in_use: AtomicUsize,
}

impl WorkerSlots {
    /// Pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(SlotsInner {
                capacity: capacity.max(1),
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Take a free slot, or `None` when all are in use.
    pub fn try_acquire(&self) -> Option<WorkerSlot> {
        let mut cur = self.inner.in_use.load(Ordering::Acquire);
        loop {
            if cur >= self.inner.capacity {
                return None;
            }
            match self.inner.in_use.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(WorkerSlot {
                        inner: self.inner.clone(),
                    });
                }
                Err(actual) => cur = actual,
            }
        }
    }

    /// Total slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.inner.capacity.saturating_sub(self.in_use())
    }
}

/// One held unit of render concurrency. Released exactly once, on drop.
#[derive(Debug)]
pub struct WorkerSlot {
    inner: Arc<SlotsInner>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.inner.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/executor/slots.rs"]
mod tests;
