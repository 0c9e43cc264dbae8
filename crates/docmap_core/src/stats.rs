//! Mapping-layer statistics.
//!
//! Counters describing what the mapping layer did on top of the store:
//! writes performed and skipped, pool hits, decode failures swallowed on
//! read paths and migration outcomes.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = db.stats();
//! println!("Writes: {}", stats.writes());
//! println!("Skipped: {}", stats.skipped_writes());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Mapping-layer statistics.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct Stats {
    writes: AtomicU64,
    skipped_writes: AtomicU64,
    deletes: AtomicU64,
    pool_hits: AtomicU64,
    pool_misses: AtomicU64,
    decode_failures: AtomicU64,
    migrations_run: AtomicU64,
    migrations_skipped: AtomicU64,
}

impl Stats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_write(&self) {
        self.skipped_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_hit(&self) {
        self.pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_miss(&self) {
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_migration_run(&self) {
        self.migrations_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_migration_skipped(&self) {
        self.migrations_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Documents written by saves.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Saves that found the content hash unchanged and did not write.
    pub fn skipped_writes(&self) -> u64 {
        self.skipped_writes.load(Ordering::Relaxed)
    }

    /// Documents removed, cascaded removals included.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Lookups answered by an already pooled instance.
    pub fn pool_hits(&self) -> u64 {
        self.pool_hits.load(Ordering::Relaxed)
    }

    /// Documents decoded into a new pooled instance.
    pub fn pool_misses(&self) -> u64 {
        self.pool_misses.load(Ordering::Relaxed)
    }

    /// Rows skipped on read paths because they failed to decode.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Migrations whose steps were executed.
    pub fn migrations_run(&self) -> u64 {
        self.migrations_run.load(Ordering::Relaxed)
    }

    /// Migrations recorded as skipped because their collection was empty.
    pub fn migrations_skipped(&self) -> u64 {
        self.migrations_skipped.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            writes: self.writes(),
            skipped_writes: self.skipped_writes(),
            deletes: self.deletes(),
            pool_hits: self.pool_hits(),
            pool_misses: self.pool_misses(),
            decode_failures: self.decode_failures(),
            migrations_run: self.migrations_run(),
            migrations_skipped: self.migrations_skipped(),
        }
    }
}

/// A point-in-time snapshot of [`Stats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Documents written by saves.
    pub writes: u64,
    /// Saves skipped as unchanged.
    pub skipped_writes: u64,
    /// Documents removed.
    pub deletes: u64,
    /// Pool hits.
    pub pool_hits: u64,
    /// Pool misses.
    pub pool_misses: u64,
    /// Rows skipped on read paths.
    pub decode_failures: u64,
    /// Migrations executed.
    pub migrations_run: u64,
    /// Migrations skipped on empty collections.
    pub migrations_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = Stats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = Stats::new();
        stats.record_write();
        stats.record_write();
        stats.record_skipped_write();
        stats.record_pool_hit();

        let snap = stats.snapshot();
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.skipped_writes, 1);
        assert_eq!(snap.pool_hits, 1);
        assert_eq!(snap.pool_misses, 0);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(Stats::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let s = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    s.record_delete();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.deletes(), 800);
    }
}
