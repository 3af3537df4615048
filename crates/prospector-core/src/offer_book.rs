//! Learned mapping from coins offered to digs granted.
//!
//! The price controller decides how much the issuers *may* spend on a
//! permit. The offer book decides how much they *do* spend: the server may
//! grant the same number of digs for less, so periodically an issuer makes
//! an experimental offer at a small untested amount and the outcome is
//! recorded. Other offers exploit what has been learned.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::PricingConfig;

/// One planned permit purchase and, once committed, its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceOffer {
    /// Coins the offer intends to spend.
    pub coins_amount: u64,
    /// Coins actually withdrawn from the wallet.
    pub real_amount: u64,
    /// Digs granted by the resulting permit.
    pub permit_uses: u64,
    /// Whether the purchase failed.
    pub failed: bool,
    experimental: bool,
}

impl PriceOffer {
    const fn new(coins_amount: u64, experimental: bool) -> Self {
        Self {
            coins_amount,
            real_amount: 0,
            permit_uses: 0,
            failed: false,
            experimental,
        }
    }

    /// Whether this offer tests an untried amount.
    pub const fn is_experimental(&self) -> bool {
        self.experimental
    }
}

#[derive(Debug)]
struct BookState {
    requests: u64,
    untested: BinaryHeap<Reverse<u64>>,
    results: BTreeMap<u64, u64>,
}

/// Thread-safe offer selector shared by the issuers.
#[derive(Debug)]
pub struct OfferBook {
    experiment_period: u64,
    state: Mutex<BookState>,
}

impl OfferBook {
    /// Seed the untested amounts `1, 4, 7, ...` below `config.experiments`.
    pub fn new(config: &PricingConfig) -> Self {
        let untested = (1..config.experiments).step_by(3).map(Reverse).collect();
        Self {
            experiment_period: config.experiment_period.max(1),
            state: Mutex::new(BookState {
                requests: 0,
                untested,
                results: BTreeMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Choose an offer not exceeding `ceiling` coins.
    pub fn next(&self, ceiling: u64) -> PriceOffer {
        let mut state = self.state();
        state.requests = state.requests.saturating_add(1);
        if state.requests.is_multiple_of(self.experiment_period)
            && let Some(Reverse(amount)) = state.untested.peek().copied()
            && amount <= ceiling
        {
            state.untested.pop();
            return PriceOffer::new(amount, true);
        }
        PriceOffer::new(best_amount(&state.results, ceiling), false)
    }

    /// Record the outcome of an offer.
    ///
    /// Exploit offers teach nothing. An experiment that failed, or could not
    /// be fully funded, goes back to the untested set.
    pub fn commit(&self, offer: &PriceOffer) {
        if !offer.experimental {
            return;
        }
        let mut state = self.state();
        if offer.failed || offer.real_amount != offer.coins_amount {
            state.untested.push(Reverse(offer.coins_amount));
            return;
        }
        state.results.insert(offer.coins_amount, offer.permit_uses);
    }

    /// Learned amount to digs table, cheapest first.
    pub fn snapshot(&self) -> Vec<(u64, u64)> {
        self.state()
            .results
            .iter()
            .map(|(&amount, &digs)| (amount, digs))
            .collect()
    }

    /// Amounts still waiting to be tried.
    pub fn untested(&self) -> usize {
        self.state().untested.len()
    }
}

/// Cheapest learned amount with the most digs within `ceiling`, else `ceiling`.
fn best_amount(results: &BTreeMap<u64, u64>, ceiling: u64) -> u64 {
    let mut amount = ceiling;
    let mut most_digs = 0;
    for (&offered, &digs) in results.range(..=ceiling) {
        if digs > most_digs {
            most_digs = digs;
            amount = offered;
        }
    }
    amount
}
