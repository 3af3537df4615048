//! Exploration workers: steady-state explorers, deadline-bound
//! pre-explorers and the timer that relaunches pre-exploration batches.

use std::sync::Arc;

use prospector_types::Region;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::channel::SharedReceiver;
use super::{Pipeline, deadline_after};
use crate::api::GameApi;
use crate::stats::PipelineStats;

impl<A: GameApi> Pipeline<A> {
    /// Apply the treasure threshold to an explored region.
    fn admit(&self, region: Region, amount: u64) -> Option<Region> {
        if amount < self.config.world.min_treasures_per_region {
            PipelineStats::bump(&self.stats.regions_skipped);
            return None;
        }
        PipelineStats::bump(&self.stats.regions_queued);
        Some(region.with_treasures(amount))
    }

    /// Explore seeds until they run out, pushing with backpressure.
    pub(super) async fn explorer(self: Arc<Self>, seeds: SharedReceiver<Region>) {
        while let Some(region) = seeds.recv().await {
            match self.api.explore(region.area()).await {
                Ok(report) => {
                    PipelineStats::bump(&self.stats.explore_ok);
                    if let Some(region) = self.admit(region, report.amount) {
                        self.queue.push(region).await;
                    }
                }
                Err(err) => {
                    PipelineStats::bump(&self.stats.explore_errors);
                    debug!(x = region.x, y = region.y, %err, "explore failed");
                }
            }
        }
        debug!("explorer out of seeds");
    }

    /// Explore seeds until `deadline` passes or `budget` regions were queued.
    ///
    /// Pushes bypass the high-water mark. Termination is only checked
    /// between attempts.
    pub(super) async fn pre_explore(
        self: Arc<Self>,
        seeds: SharedReceiver<Region>,
        deadline: Instant,
        budget: usize,
    ) {
        let mut queued = 0_usize;
        while queued < budget {
            let Ok(Some(region)) = tokio::time::timeout_at(deadline, seeds.recv()).await else {
                break;
            };
            PipelineStats::bump(&self.stats.pre_explore_attempts);
            match self.api.explore_before(region.area(), deadline).await {
                Ok(report) => {
                    PipelineStats::bump(&self.stats.explore_ok);
                    if let Some(region) = self.admit(region, report.amount) {
                        self.queue.push_non_blocking(region);
                        queued = queued.saturating_add(1);
                    }
                }
                Err(err) => {
                    PipelineStats::bump(&self.stats.explore_errors);
                    debug!(x = region.x, y = region.y, %err, "pre-explore failed");
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        debug!(queued, "pre-explorer finished");
    }

    /// Periodically launch a batch of pre-explorers to backfill the queue.
    pub(super) async fn re_explore(self: Arc<Self>, seeds: SharedReceiver<Region>) {
        let workers = &self.config.workers;
        let period = workers.re_explore_interval();
        let mut ticker = tokio::time::interval_at(deadline_after(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch = JoinSet::new();
        loop {
            ticker.tick().await;
            while batch.try_join_next().is_some() {}
            let deadline = deadline_after(workers.pre_exploration_timeout());
            for _ in 0..workers.re_explore_batch {
                batch.spawn(Arc::clone(&self).pre_explore(
                    seeds.clone(),
                    deadline,
                    workers.pre_explore_budget,
                ));
            }
            info!(
                workers = workers.re_explore_batch,
                queued = self.queue.size(),
                "re-exploration batch launched"
            );
        }
    }
}
