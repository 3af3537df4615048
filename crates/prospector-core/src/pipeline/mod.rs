//! The harvesting pipeline.
//!
//! [`Pipeline`] owns every shared component and runs fixed pools of
//! workers around them:
//!
//! ```text
//! seeds -> explorers -> RegionQueue -> diggers -> treasures -> cashers
//!                                         ^                      |
//!                                    PermitPool              CoinWallet
//!                                         ^                      |
//!                                         +------ issuers <------+
//! ```
//!
//! Workers never reference each other; they only meet through the shared
//! components and the seed and treasure channels. A failed remote call is
//! counted and absorbed by the worker that made it. Only the startup health
//! check is fatal.
//!
//! # Bootstrap
//!
//! [`Pipeline::start`] checks server health, logs any permits already held,
//! seeds the shuffled world tiles, and runs the pre-exploration workers
//! until their deadline (or until they run out of seeds) before starting
//! the steady-state pools, the re-exploration timer and the price
//! controller.

mod cash;
mod channel;
mod dig;
mod explore;
mod issue;

use std::sync::Arc;
use std::time::Duration;

use prospector_types::{Region, TreasureId};
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, GameApi};
use crate::config::PipelineConfig;
use crate::depth_optimizer::DepthOptimizer;
use crate::offer_book::OfferBook;
use crate::permit_pool::PermitPool;
use crate::price_controller::PriceController;
use crate::region_queue::RegionQueue;
use crate::stats::PipelineStats;
use crate::wallet::CoinWallet;

use self::channel::SharedReceiver;

/// Every shared component plus the game server client.
#[derive(Debug)]
pub struct Pipeline<A> {
    api: A,
    config: PipelineConfig,
    queue: RegionQueue,
    wallet: CoinWallet,
    permits: PermitPool,
    prices: Arc<PriceController>,
    offers: OfferBook,
    depth: DepthOptimizer,
    stats: PipelineStats,
}

/// Running worker tasks. Dropping the handle aborts them.
#[derive(Debug)]
pub struct PipelineHandle {
    tasks: JoinSet<()>,
}

impl PipelineHandle {
    /// Number of tasks still tracked.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether every task has finished.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next task to finish. Returns `false` once none are left.
    ///
    /// Workers run until aborted, so in steady state this only returns when
    /// a worker panicked or a finite pool (the explorers) ran dry.
    pub async fn join_next(&mut self) -> bool {
        match self.tasks.join_next().await {
            Some(Err(err)) if err.is_panic() => {
                error!(%err, "pipeline task panicked");
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Abort every task and wait for them to stop.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}

impl<A: GameApi> Pipeline<A> {
    /// Build the components from configuration.
    pub fn new(api: A, config: PipelineConfig) -> Arc<Self> {
        Arc::new(Self {
            queue: RegionQueue::new(config.queue.high_water),
            wallet: CoinWallet::new(),
            permits: PermitPool::new(config.permits.max_concurrent),
            prices: Arc::new(PriceController::new(config.pricing.initial_price)),
            offers: OfferBook::new(&config.pricing),
            depth: DepthOptimizer::new(config.world.max_depth, &config.depth),
            stats: PipelineStats::default(),
            api,
            config,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The game server client.
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Explored regions waiting for a digger.
    pub const fn queue(&self) -> &RegionQueue {
        &self.queue
    }

    /// Coins earned and not yet spent.
    pub const fn wallet(&self) -> &CoinWallet {
        &self.wallet
    }

    /// Digging permits.
    pub const fn permits(&self) -> &PermitPool {
        &self.permits
    }

    /// Permit pricing.
    pub fn prices(&self) -> &PriceController {
        &self.prices
    }

    /// Learned offer amounts.
    pub const fn offers(&self) -> &OfferBook {
        &self.offers
    }

    /// Dig depth selection.
    pub const fn depth(&self) -> &DepthOptimizer {
        &self.depth
    }

    /// Pipeline counters.
    pub const fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Run the bootstrap sequence and spawn every worker.
    ///
    /// # Errors
    ///
    /// Returns the health-check error if the game server is not reachable.
    pub async fn start(self: &Arc<Self>) -> Result<PipelineHandle, ApiError> {
        if let Err(err) = self.api.health_check().await {
            error!(%err, "game server health check failed");
            return Err(err);
        }
        info!("game server healthy");

        match self.api.list_licenses().await {
            Ok(licenses) => {
                let digs: u64 = licenses.iter().map(|l| l.digs_remaining()).sum();
                info!(count = licenses.len(), digs, "licenses already held");
            }
            Err(err) => warn!(%err, "could not list licenses"),
        }

        let seeds = self.seed_regions();
        let workers = &self.config.workers;
        let mut tasks = JoinSet::new();

        if let Some(period) = self.config.logging.status_interval() {
            tasks.spawn(Arc::clone(self).report_status(period));
        }

        let timeout = workers.pre_exploration_timeout();
        let deadline = deadline_after(timeout);
        info!(
            workers = workers.pre_explorers,
            timeout_ms = workers.pre_exploration_timeout_ms,
            "pre-exploration started"
        );
        let mut pre = JoinSet::new();
        for _ in 0..workers.pre_explorers {
            pre.spawn(Arc::clone(self).pre_explore(
                seeds.clone(),
                deadline,
                workers.pre_explore_budget,
            ));
        }
        let drained = tokio::time::timeout_at(deadline, async {
            while pre.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        pre.shutdown().await;
        info!(
            drained,
            queued = self.queue.size(),
            "pre-exploration finished"
        );

        if workers.re_explore_batch > 0 {
            tasks.spawn(Arc::clone(self).re_explore(seeds.clone()));
        }

        let (treasure_tx, treasure_rx) = mpsc::channel::<TreasureId>(
            self.config.queue.treasure_channel_capacity.max(1),
        );
        let treasure_rx = SharedReceiver::new(treasure_rx);

        for _ in 0..workers.issuers {
            tasks.spawn(Arc::clone(self).issuer());
        }
        for _ in 0..workers.cashers {
            tasks.spawn(Arc::clone(self).casher(treasure_rx.clone()));
        }
        for _ in 0..workers.explorers {
            tasks.spawn(Arc::clone(self).explorer(seeds.clone()));
        }
        for _ in 0..workers.diggers {
            tasks.spawn(Arc::clone(self).digger(treasure_tx.clone()));
        }
        tasks.spawn(Arc::clone(&self.prices).run(self.config.pricing.clone()));

        info!(
            explorers = workers.explorers,
            diggers = workers.diggers,
            cashers = workers.cashers,
            issuers = workers.issuers,
            "pipeline running"
        );
        Ok(PipelineHandle { tasks })
    }

    /// Tile the world, shuffle the tiles and queue them as seeds.
    ///
    /// The sender is dropped here, so seed consumers stop once every tile
    /// has been taken.
    fn seed_regions(&self) -> SharedReceiver<Region> {
        let world = &self.config.world;
        let mut tiles = Region::tile(
            world.x,
            world.y,
            world.width,
            world.height,
            world.block_width,
            world.block_height,
        );
        tiles.shuffle(&mut rand::rng());

        let (tx, rx) = mpsc::channel(tiles.len().max(1));
        let count = tiles.len();
        for tile in tiles {
            if tx.try_send(tile).is_err() {
                warn!("seed channel rejected a tile");
                break;
            }
        }
        info!(regions = count, "world seeded");
        SharedReceiver::new(rx)
    }

    async fn report_status(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snap = self.stats.snapshot();
            let pool = self.permits.stats();
            info!(
                balance = self.wallet.balance(),
                price = self.prices.price(),
                best_depth = self.depth.best(),
                queued_regions = self.queue.size(),
                high_water = self.queue.high_water(),
                live_permits = pool.live,
                in_flight_permits = pool.in_flight(),
                coins_earned = snap.coins_earned,
                coins_spent = snap.coins_spent,
                treasures_found = snap.treasures_found,
                treasures_lost = snap.treasures_lost,
                dig_ok = snap.dig_ok,
                dig_empty = snap.dig_empty,
                dig_errors = snap.dig_errors,
                explore_errors = snap.explore_errors,
                permits_issued = snap.permits_issued,
                permits_failed = snap.permits_failed,
                max_depth = snap.observed_max_depth,
                "status"
            );
            debug!(
                offers = ?self.offers.snapshot(),
                depths = ?self.depth.statistics(),
                "learned tables"
            );
        }
    }
}

/// `now + timeout`, or `now` if that is not representable.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now)
}
