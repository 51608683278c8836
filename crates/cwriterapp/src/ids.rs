//! Timestamp-derived identifiers.
//!
//! Ids are epoch milliseconds rendered as decimal strings. Within one process
//! the generator is strictly monotonic: a second id requested in the same
//! millisecond gets the next integer instead of a duplicate.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate.to_string(),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let ids = IdGenerator::new();
        let generated: Vec<i64> = (0..500)
            .map(|_| ids.next_id().parse().unwrap())
            .collect();
        assert!(generated.windows(2).all(|w| w[0] < w[1]));
        let unique: HashSet<_> = generated.iter().collect();
        assert_eq!(unique.len(), generated.len());
    }

    #[test]
    fn test_ids_track_wall_clock() {
        let before = Utc::now().timestamp_millis();
        let id: i64 = IdGenerator::new().next_id().parse().unwrap();
        assert!(id >= before);
    }
}
