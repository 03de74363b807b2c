use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Plain unsigned counters. Atomic so the producer's delivery
/// callback — which runs on a producer-owned thread — can increment
/// `producer_delivery_errors` without a lock; everything else is
/// written from the single dispatcher thread.
#[derive(Default)]
pub struct Counters {
    pub tx: AtomicU64,
    pub txerr: AtomicU64,
    pub producer_delivery_errors: AtomicU64,
    pub truncated: AtomicU64,
    pub scratch_overflows: AtomicU64,
    pub overflow_buffers_allocated: AtomicU64,
    pub current_transaction_count: AtomicU64,
    pub sequence_number: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(field: &AtomicU64) {
        field.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set(field: &AtomicU64, value: u64) {
        field.store(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            tx: self.tx.load(Ordering::Relaxed),
            txerr: self.txerr.load(Ordering::Relaxed),
            producer_delivery_errors: self.producer_delivery_errors.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            scratch_overflows: self.scratch_overflows.load(Ordering::Relaxed),
            overflow_buffers_allocated: self.overflow_buffers_allocated.load(Ordering::Relaxed),
            current_transaction_count: self.current_transaction_count.load(Ordering::Relaxed),
            sequence_number: self.sequence_number.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub tx: u64,
    pub txerr: u64,
    pub producer_delivery_errors: u64,
    pub truncated: u64,
    pub scratch_overflows: u64,
    pub overflow_buffers_allocated: u64,
    pub current_transaction_count: u64,
    pub sequence_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_visible_in_snapshot() {
        let counters = Counters::new();
        Counters::incr(&counters.tx);
        Counters::incr(&counters.tx);
        Counters::incr(&counters.truncated);
        let snap = counters.snapshot();
        assert_eq!(snap.tx, 2);
        assert_eq!(snap.truncated, 1);
    }
}
