//! Record id generation.
//!
//! Ids double as the merge key across peers, so every generator must hand out
//! strictly increasing values within one instance.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> i64;
}

/// Wall-clock millisecond ids, bumped past the previous id when two calls land
/// in the same millisecond (or the clock steps backwards).
#[derive(Debug, Default)]
pub struct MonotonicIdGenerator {
    last: AtomicI64,
}

impl MonotonicIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for MonotonicIdGenerator {
    fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Plain counter. Deterministic ids for tests and replay tooling.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    next: AtomicI64,
}

impl SequenceIdGenerator {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_monotonic_ids_strictly_increase_in_tight_loop() {
        let ids = MonotonicIdGenerator::new();
        let mut prev = ids.next_id();
        for _ in 0..10_000 {
            let next = ids.next_id();
            assert!(next > prev, "{next} not greater than {prev}");
            prev = next;
        }
    }

    #[test]
    fn test_monotonic_ids_unique_across_threads() {
        let ids = Arc::new(MonotonicIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1_000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4_000);
    }

    #[test]
    fn test_monotonic_ids_are_millisecond_scale() {
        let id = MonotonicIdGenerator::new().next_id();
        assert!(id >= Utc::now().timestamp_millis() - 1_000);
    }

    #[test]
    fn test_sequence_ids() {
        let ids = SequenceIdGenerator::starting_at(100);
        assert_eq!(ids.next_id(), 100);
        assert_eq!(ids.next_id(), 101);
    }
}
