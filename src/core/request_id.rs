//! Correlation id sources for outbound WebSocket frames
//!
//! Ids only need to be unique for the lifetime of a session's consumers.
//! Sources are injected into sessions instead of living in a global counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of correlation ids
pub trait IdSource: Send + Sync {
    /// Allocate the next id
    fn next_id(&self) -> u64;
}

/// Monotonic in-process counter starting at 1
#[derive(Debug)]
pub struct AtomicIdSource {
    next: AtomicU64,
}

impl AtomicIdSource {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for AtomicIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for AtomicIdSource {
    #[inline]
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Tracking nonce: microseconds since the Unix epoch, bumped when the clock
/// has not advanced since the previous id.
///
/// Unlike [`AtomicIdSource`] the values stay increasing across restarts, which
/// venues that use the id as a signing nonce require.
#[derive(Debug, Default)]
pub struct NonceIdSource {
    last: AtomicU64,
}

impl NonceIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_micros() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl IdSource for NonceIdSource {
    fn next_id(&self) -> u64 {
        let now = Self::now_micros();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_atomic_ids_are_sequential() {
        let ids = AtomicIdSource::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn test_atomic_starting_at() {
        let ids = AtomicIdSource::starting_at(100);
        assert_eq!(ids.next_id(), 100);
    }

    #[test]
    fn test_nonce_strictly_increasing() {
        let ids = NonceIdSource::new();
        let mut prev = ids.next_id();
        for _ in 0..1_000 {
            let next = ids.next_id();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids: Arc<dyn IdSource> = Arc::new(NonceIdSource::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 2_000);
    }
}
