//! Concurrent bag of coin units.
//!
//! Coins are fungible, so the wallet is an unordered multiset. Withdrawals
//! take units from the tail of the backing vector; the order in which units
//! come back out is unspecified.

use std::sync::{Mutex, MutexGuard, PoisonError};

use prospector_types::CoinId;

/// Thread-safe store of coin units with batched withdraw and deposit.
#[derive(Debug, Default)]
pub struct CoinWallet {
    coins: Mutex<Vec<CoinId>>,
}

impl CoinWallet {
    /// Create an empty wallet.
    pub fn new() -> Self {
        Self::default()
    }

    fn coins(&self) -> MutexGuard<'_, Vec<CoinId>> {
        self.coins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove up to `n` coins. Never returns more units than are present.
    pub fn withdraw(&self, n: usize) -> Vec<CoinId> {
        let mut coins = self.coins();
        let keep = coins.len().saturating_sub(n);
        coins.split_off(keep)
    }

    /// Add coins to the wallet.
    pub fn deposit<I>(&self, coins: I)
    where
        I: IntoIterator<Item = CoinId>,
    {
        self.coins().extend(coins);
    }

    /// Number of coins currently held.
    pub fn balance(&self) -> usize {
        self.coins().len()
    }
}
