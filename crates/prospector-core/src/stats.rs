//! Pipeline counters.
//!
//! Workers bump relaxed atomics on the hot path; the status reporter reads
//! them through [`PipelineStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by every worker.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Explore calls that returned a report.
    pub explore_ok: AtomicU64,
    /// Explore calls that failed.
    pub explore_errors: AtomicU64,
    /// Pre-exploration attempts started.
    pub pre_explore_attempts: AtomicU64,
    /// Regions pushed into the region queue.
    pub regions_queued: AtomicU64,
    /// Regions dropped for reporting too little treasure.
    pub regions_skipped: AtomicU64,
    /// Digs that returned treasure.
    pub dig_ok: AtomicU64,
    /// Digs that found nothing.
    pub dig_empty: AtomicU64,
    /// Digs rejected for an unknown or spent permit.
    pub dig_no_license: AtomicU64,
    /// Digs rejected for exceeding the server depth.
    pub dig_wrong_depth: AtomicU64,
    /// Digs rejected for bad coordinates.
    pub dig_wrong_coordinates: AtomicU64,
    /// Digs that failed for any other reason.
    pub dig_errors: AtomicU64,
    /// Treasure ids recovered by digging.
    pub treasures_found: AtomicU64,
    /// Treasure ids that could not be cashed or forwarded.
    pub treasures_lost: AtomicU64,
    /// Cash calls that succeeded.
    pub cash_ok: AtomicU64,
    /// Cash calls that failed.
    pub cash_errors: AtomicU64,
    /// Coins received from cashing.
    pub coins_earned: AtomicU64,
    /// Coins spent on permits.
    pub coins_spent: AtomicU64,
    /// Permits issued and registered.
    pub permits_issued: AtomicU64,
    /// Permit purchases that failed or granted no digs.
    pub permits_failed: AtomicU64,
    /// Deepest depth the server has accepted, learned from depth errors.
    pub observed_max_depth: AtomicU64,
}

/// Plain copy of [`PipelineStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub explore_ok: u64,
    pub explore_errors: u64,
    pub pre_explore_attempts: u64,
    pub regions_queued: u64,
    pub regions_skipped: u64,
    pub dig_ok: u64,
    pub dig_empty: u64,
    pub dig_no_license: u64,
    pub dig_wrong_depth: u64,
    pub dig_wrong_coordinates: u64,
    pub dig_errors: u64,
    pub treasures_found: u64,
    pub treasures_lost: u64,
    pub cash_ok: u64,
    pub cash_errors: u64,
    pub coins_earned: u64,
    pub coins_spent: u64,
    pub permits_issued: u64,
    pub permits_failed: u64,
    pub observed_max_depth: u64,
}

impl PipelineStats {
    /// Add one to a counter.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Raise the observed max depth to `depth` if it is deeper.
    pub fn observe_max_depth(&self, depth: u32) {
        self.observed_max_depth
            .fetch_max(u64::from(depth), Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            explore_ok: get(&self.explore_ok),
            explore_errors: get(&self.explore_errors),
            pre_explore_attempts: get(&self.pre_explore_attempts),
            regions_queued: get(&self.regions_queued),
            regions_skipped: get(&self.regions_skipped),
            dig_ok: get(&self.dig_ok),
            dig_empty: get(&self.dig_empty),
            dig_no_license: get(&self.dig_no_license),
            dig_wrong_depth: get(&self.dig_wrong_depth),
            dig_wrong_coordinates: get(&self.dig_wrong_coordinates),
            dig_errors: get(&self.dig_errors),
            treasures_found: get(&self.treasures_found),
            treasures_lost: get(&self.treasures_lost),
            cash_ok: get(&self.cash_ok),
            cash_errors: get(&self.cash_errors),
            coins_earned: get(&self.coins_earned),
            coins_spent: get(&self.coins_spent),
            permits_issued: get(&self.permits_issued),
            permits_failed: get(&self.permits_failed),
            observed_max_depth: get(&self.observed_max_depth),
        }
    }
}
