//! Monotonic id minting.
//!
//! Ids are generated from a single atomic counter seeded from wall-clock
//! millis at construction, prefixed by role: `fact_`, `rule_`, `skc_`,
//! `skf_`, `query_`. The counter only moves forward, so ids are unique
//! for the lifetime of the generator and sort roughly by creation time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use smol_str::SmolStr;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Monotonic id generator shared across the engine.
#[derive(Debug)]
pub struct IdGen {
    counter: AtomicU64,
}

impl IdGen {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(now_millis()),
        }
    }

    /// Mint the next id with the given role prefix, e.g. `next("fact_")`.
    pub fn next(&self, prefix: &str) -> SmolStr {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        SmolStr::new(format!("{prefix}{n}"))
    }

    /// The raw next counter value, for names that embed more structure
    /// than `prefix + counter` (Skolem constants and functions).
    pub fn next_raw(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let ids = IdGen::new();
        let a = ids.next("fact_");
        let b = ids.next("fact_");
        assert!(a.starts_with("fact_"));
        assert_ne!(a, b);
    }

    #[test]
    fn raw_counter_is_monotonic() {
        let ids = IdGen::new();
        let a = ids.next_raw();
        let b = ids.next_raw();
        assert!(b > a);
    }
}
