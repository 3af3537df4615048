//! Dig depth selection from observed yield and time cost.
//!
//! Deeper digs cost more time and may find more treasure. The optimizer
//! keeps a running mean of both per depth and periodically picks the depth
//! that maximizes *cumulative* yield over *cumulative* time, since reaching
//! depth `d` means paying for every depth above it. Every `k`-th call to
//! [`DepthOptimizer::next`] returns the maximum depth regardless, so deep
//! statistics keep being refreshed even while a shallow depth is winning.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::config::DepthConfig;

/// Running means for one depth.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DepthStatistic {
    /// Mean seconds spent on a dig at this depth.
    pub mean_time: f64,
    /// Mean treasures found by a dig at this depth.
    pub mean_yield: f64,
    /// Number of samples folded in.
    pub samples: u64,
}

impl DepthStatistic {
    #[allow(clippy::cast_precision_loss)]
    fn record(&mut self, yield_count: u64, seconds: f64) {
        let n = self.samples as f64;
        let keep = n / (n + 1.0);
        self.mean_yield = self.mean_yield.mul_add(keep, yield_count as f64 / (n + 1.0));
        self.mean_time = self.mean_time.mul_add(keep, seconds / (n + 1.0));
        self.samples = self.samples.saturating_add(1);
    }
}

#[derive(Debug)]
struct DepthState {
    next_calls: u64,
    registrations: u64,
    best: u32,
    stats: Vec<DepthStatistic>,
}

/// Shared depth selector. Wrap in `Arc` to share between diggers.
#[derive(Debug)]
pub struct DepthOptimizer {
    max_depth: u32,
    forced_sample_interval: u64,
    recompute_interval: u64,
    state: RwLock<DepthState>,
}

impl DepthOptimizer {
    /// Create an optimizer for depths `1..=max_depth`, starting at the maximum.
    pub fn new(max_depth: u32, config: &DepthConfig) -> Self {
        Self {
            max_depth,
            forced_sample_interval: config.forced_sample_interval.max(1),
            recompute_interval: config.recompute_interval.max(1),
            state: RwLock::new(DepthState {
                next_calls: 0,
                registrations: 0,
                best: max_depth,
                stats: vec![DepthStatistic::default(); max_depth as usize],
            }),
        }
    }

    /// Depth to dig to for the next cell.
    pub fn next(&self) -> u32 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_calls = state.next_calls.saturating_add(1);
        if state.next_calls >= self.forced_sample_interval {
            state.next_calls = 0;
            return self.max_depth;
        }
        state.best
    }

    /// Record the outcome of one dig attempt at `depth`.
    ///
    /// Depths outside `1..=max_depth` are ignored.
    pub fn register(&self, depth: u32, yield_count: u64, elapsed: Duration) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(stat) = depth
            .checked_sub(1)
            .and_then(|i| state.stats.get_mut(i as usize))
        else {
            return;
        };
        stat.record(yield_count, elapsed.as_secs_f64());

        state.registrations = state.registrations.saturating_add(1);
        if state.registrations >= self.recompute_interval {
            state.registrations = 0;
            let best = best_depth(&state.stats).unwrap_or(state.best);
            if best != state.best {
                debug!(from = state.best, to = best, "best depth changed");
            }
            state.best = best;
        }
    }

    /// Current best depth.
    pub fn best(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .best
    }

    /// Copy of the per-depth statistics, shallowest first.
    pub fn statistics(&self) -> Vec<DepthStatistic> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .clone()
    }
}

/// Depth maximizing cumulative yield over cumulative time. Ties go shallower.
fn best_depth(stats: &[DepthStatistic]) -> Option<u32> {
    let mut best = None;
    let mut best_ratio = 0.0;
    let mut total_time = 0.0;
    let mut total_yield = 0.0;
    for (depth, stat) in (1_u32..).zip(stats) {
        total_time += stat.mean_time;
        total_yield += stat.mean_yield;
        if total_time <= 0.0 {
            continue;
        }
        let ratio = total_yield / total_time;
        if ratio > best_ratio {
            best_ratio = ratio;
            best = Some(depth);
        }
    }
    best
}
