//! Adaptive permit pricing.
//!
//! A benchmark task samples the cumulative coin inflow every
//! `benchmark_interval`, turns the delta into a coins-per-second rate and
//! folds it into a running average. The pricing loop feeds that average
//! into [`PriceSearch`], a hill climber that probes the current price,
//! steps up when the probe budget is spent and falls back to the best
//! price seen when the rate drifts below it. Readers only ever do an
//! atomic load of the current price.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::PricingConfig;

// ---------------------------------------------------------------------------
// Search state machine
// ---------------------------------------------------------------------------

/// What the search does with the next rate sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Fold the sample into the average for the current price.
    Probing,
    /// Fall back to the best price seen, or halve it if already there.
    Decrease,
    /// Record the probe result and raise the price.
    Increase,
}

/// Hill-climbing search over the permit price.
#[derive(Debug, Clone)]
pub struct PriceSearch {
    price: u64,
    sample_budget: f64,
    drift_threshold: f64,
    step_growth: f64,
    samples: u32,
    average: f64,
    best_rate: f64,
    best_price: u64,
    step: f64,
}

impl PriceSearch {
    /// Start probing at `config.initial_price`.
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            price: config.initial_price,
            sample_budget: f64::from(config.sample_budget),
            drift_threshold: config.drift_threshold,
            step_growth: config.step_growth,
            samples: 0,
            average: 0.0,
            best_rate: 0.0,
            best_price: config.initial_price,
            step: 1.0,
        }
    }

    /// Current price.
    pub const fn price(&self) -> u64 {
        self.price
    }

    /// Best rate recorded so far and the price it was recorded at.
    pub const fn best(&self) -> (f64, u64) {
        (self.best_rate, self.best_price)
    }

    /// Mode the next sample will be handled in.
    pub fn mode(&self) -> SearchMode {
        let samples = f64::from(self.samples);
        let drifted = self.average > 0.0
            && self.best_rate / self.average >= self.drift_threshold
            && samples > self.sample_budget / 5.0;
        let stalled = self.average <= 0.0 && samples > self.sample_budget / 6.0;
        if drifted || stalled {
            SearchMode::Decrease
        } else if samples >= self.sample_budget {
            SearchMode::Increase
        } else {
            SearchMode::Probing
        }
    }

    /// Handle one rate sample and return the mode it was handled in.
    ///
    /// Samples arriving on a transition are dropped.
    pub fn observe(&mut self, rate: f64) -> SearchMode {
        let mode = self.mode();
        match mode {
            SearchMode::Probing => {
                let n = f64::from(self.samples);
                self.average = self.average.mul_add(n, rate) / (n + 1.0);
                self.samples = self.samples.saturating_add(1);
            }
            SearchMode::Decrease => {
                if self.best_price == self.price {
                    self.best_price /= 2;
                    self.best_rate = 0.0;
                }
                self.price = self.best_price;
                self.step = 1.0;
                self.reset_probe();
            }
            SearchMode::Increase => {
                if self.average > self.best_rate {
                    self.best_rate = self.average;
                    self.best_price = self.price;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let increment = (self.step.floor() as u64).max(1);
                self.price = self.price.saturating_add(increment);
                self.step *= self.step_growth;
                self.reset_probe();
            }
        }
        mode
    }

    const fn reset_probe(&mut self) {
        self.average = 0.0;
        self.samples = 0;
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Shared price source and inflow counter.
#[derive(Debug)]
pub struct PriceController {
    inflow: AtomicI64,
    price: AtomicU64,
}

impl PriceController {
    /// Create a controller publishing `initial_price` until the search moves.
    pub const fn new(initial_price: u64) -> Self {
        Self {
            inflow: AtomicI64::new(0),
            price: AtomicU64::new(initial_price),
        }
    }

    /// Current price ceiling for a permit purchase.
    pub fn price(&self) -> u64 {
        self.price.load(Ordering::Acquire)
    }

    /// Net coins earned minus spent so far.
    pub fn inflow(&self) -> i64 {
        self.inflow.load(Ordering::Acquire)
    }

    /// Count coins earned.
    pub fn add_coins(&self, amount: u64) {
        self.inflow
            .fetch_add(i64::try_from(amount).unwrap_or(i64::MAX), Ordering::AcqRel);
    }

    /// Count coins spent.
    pub fn delete_coins(&self, amount: u64) {
        self.inflow
            .fetch_sub(i64::try_from(amount).unwrap_or(i64::MAX), Ordering::AcqRel);
    }

    /// Run the benchmark and the pricing loop until the task is aborted.
    ///
    /// Both halves live in the calling task and talk over a single-slot
    /// channel, so aborting the task stops both.
    pub async fn run(self: Arc<Self>, config: PricingConfig) {
        let (tx, mut rx) = mpsc::channel(1);
        let mut search = PriceSearch::new(&config);
        let pricing = async {
            while let Some(rate) = rx.recv().await {
                let before = search.price();
                let mode = search.observe(rate);
                let after = search.price();
                if mode != SearchMode::Probing {
                    let (best_rate, best_price) = search.best();
                    info!(
                        ?mode,
                        from = before,
                        to = after,
                        best_rate,
                        best_price,
                        "price adjusted"
                    );
                }
                self.price.store(after, Ordering::Release);
            }
        };
        tokio::join!(Arc::clone(&self).benchmark(config.benchmark_interval(), tx), pricing);
    }

    async fn benchmark(self: Arc<Self>, interval: Duration, tx: mpsc::Sender<f64>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut last_at = Instant::now();
        let mut last_inflow = self.inflow();
        let mut average = 0.0_f64;
        let mut samples = 0.0_f64;
        loop {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last_at).as_secs_f64();
            let current = self.inflow();
            let delta = current.saturating_sub(last_inflow);
            last_at = now;
            last_inflow = current;
            if delta == 0 || elapsed <= 0.0 {
                continue;
            }

            #[allow(clippy::cast_precision_loss)]
            let rate = delta as f64 / elapsed;
            average = average.mul_add(samples, rate) / (samples + 1.0);
            samples += 1.0;
            debug!(rate, average, "inflow sampled");
            if tx.send(average).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::float_cmp)]
mod tests {
    use super::*;

    fn config(initial_price: u64) -> PricingConfig {
        PricingConfig {
            initial_price,
            sample_budget: 30,
            drift_threshold: 1.05,
            step_growth: 1.0003,
            ..PricingConfig::default()
        }
    }

    /// Inflow peaking at price 5, decreasing on both sides.
    fn peaked(price: u64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let offset = price as f64 - 5.0;
        (-10.0_f64).mul_add(offset * offset, 100.0)
    }

    #[test]
    fn probes_until_budget_then_increases() {
        let mut search = PriceSearch::new(&config(2));
        for _ in 0..30 {
            assert_eq!(search.observe(10.0), SearchMode::Probing);
        }
        assert_eq!(search.observe(10.0), SearchMode::Increase);
        assert_eq!(search.price(), 3);
        assert_eq!(search.best(), (10.0, 2));
    }

    #[test]
    fn converges_to_peak_and_stays_bounded() {
        let mut search = PriceSearch::new(&config(2));
        let mut visited = Vec::new();
        for _ in 0..5_000 {
            let price = search.price();
            search.observe(peaked(price));
            visited.push(search.price());
        }
        assert!(visited.iter().all(|&p| p <= 6));
        assert!(visited.iter().rev().take(500).all(|&p| (4..=6).contains(&p)));
        assert_eq!(search.best().1, 5);
    }

    #[test]
    fn drift_reverts_to_best_price() {
        let mut search = PriceSearch::new(&config(4));
        for _ in 0..31 {
            search.observe(10.0);
        }
        assert_eq!(search.price(), 5);

        let mut mode = SearchMode::Probing;
        while mode == SearchMode::Probing {
            mode = search.observe(1.0);
        }
        assert_eq!(mode, SearchMode::Decrease);
        assert_eq!(search.price(), 4);
    }

    #[test]
    fn decrease_at_best_price_halves_it() {
        let mut search = PriceSearch::new(&config(4));
        for _ in 0..31 {
            search.observe(10.0);
        }
        while search.observe(1.0) != SearchMode::Decrease {}
        assert_eq!(search.price(), 4);

        while search.observe(1.0) != SearchMode::Decrease {}
        assert_eq!(search.price(), 2);
        assert_eq!(search.best(), (0.0, 2));
    }

    #[test]
    fn stalled_inflow_collapses_price() {
        let mut search = PriceSearch::new(&config(8));
        let mut prices = Vec::new();
        for _ in 0..40 {
            if search.observe(-1.0) == SearchMode::Decrease {
                prices.push(search.price());
            }
        }
        assert_eq!(prices, vec![4, 2, 1, 0, 0]);
    }

    #[test]
    fn inflow_counts_both_directions() {
        let controller = PriceController::new(3);
        controller.add_coins(10);
        controller.delete_coins(4);
        assert_eq!(controller.inflow(), 6);
        assert_eq!(controller.price(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_inflow_raises_price() {
        let controller = Arc::new(PriceController::new(5));
        let config = PricingConfig {
            initial_price: 5,
            sample_budget: 3,
            drift_threshold: 1000.0,
            benchmark_interval_ms: 10,
            ..PricingConfig::default()
        };
        let pricing = tokio::spawn(Arc::clone(&controller).run(config));
        let feeder = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                loop {
                    controller.add_coins(10);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(controller.price() > 5);
        feeder.abort();
        pricing.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn no_inflow_keeps_price() {
        let controller = Arc::new(PriceController::new(7));
        let config = PricingConfig {
            initial_price: 7,
            benchmark_interval_ms: 10,
            ..PricingConfig::default()
        };
        let pricing = tokio::spawn(Arc::clone(&controller).run(config));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.price(), 7);
        pricing.abort();
    }
}
