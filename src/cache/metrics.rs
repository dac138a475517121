//! Cache Metrics
//!
//! Lock-free counters for cache operations, read through point-in-time
//! snapshots.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Cache Metrics
// =============================================================================

/// Operation counters for one cache instance
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    /// Values physically written
    writes: AtomicU64,
    /// Writes skipped by change detection
    unchanged: AtomicU64,
    write_failures: AtomicU64,
    undecodable: AtomicU64,
    removals: AtomicU64,
    clears: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    /// Last update timestamp (Unix millis)
    last_update_ms: AtomicU64,
}

macro_rules! recorder {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
                self.touch();
            }
        )*
    };
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    recorder! {
        record_hit => hits,
        record_miss => misses,
        record_write => writes,
        record_unchanged => unchanged,
        record_write_failure => write_failures,
        record_undecodable => undecodable,
        record_removal => removals,
        record_clear => clears,
        record_fetch => fetches,
        record_fetch_failure => fetch_failures,
    }

    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            last_update_ms: self.last_update_ms.load(Ordering::Acquire),
        }
    }
}

// =============================================================================
// Stats Snapshot
// =============================================================================

/// Point-in-time snapshot of cache metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub unchanged: u64,
    pub write_failures: u64,
    pub undecodable: u64,
    pub removals: u64,
    pub clears: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub last_update_ms: u64,
}

impl CacheStatsSnapshot {
    /// Get total lookups (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Share of `set` calls that change detection turned into no-ops
    pub fn skip_ratio(&self) -> f64 {
        let total = self.writes + self.unchanged;
        if total == 0 {
            0.0
        } else {
            self.unchanged as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_operations() {
        let metrics = CacheMetrics::new();

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_write();
        metrics.record_unchanged();
        metrics.record_unchanged();
        metrics.record_unchanged();

        let stats = metrics.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests(), 3);
        assert!((stats.hit_ratio() - 0.666).abs() < 0.01);
        assert!((stats.skip_ratio() - 0.75).abs() < 0.001);
        assert!(stats.last_update_ms > 0);
    }

    #[test]
    fn test_empty_ratios() {
        let stats = CacheStatsSnapshot::default();
        assert_eq!(stats.hit_ratio(), 0.0);
        assert_eq!(stats.skip_ratio(), 0.0);
    }
}
