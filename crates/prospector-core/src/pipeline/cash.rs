//! Cashing workers: treasure ids in, coins into the wallet.

use std::sync::Arc;

use prospector_types::TreasureId;
use tracing::debug;

use super::Pipeline;
use super::channel::SharedReceiver;
use crate::api::GameApi;
use crate::stats::PipelineStats;

impl<A: GameApi> Pipeline<A> {
    pub(super) async fn casher(self: Arc<Self>, treasures: SharedReceiver<TreasureId>) {
        while let Some(treasure) = treasures.recv().await {
            match self.api.cash(&treasure).await {
                Ok(coins) => {
                    let earned = coins.len() as u64;
                    PipelineStats::bump(&self.stats.cash_ok);
                    PipelineStats::add(&self.stats.coins_earned, earned);
                    self.wallet.deposit(coins);
                    self.prices.add_coins(earned);
                }
                Err(err) => {
                    PipelineStats::bump(&self.stats.cash_errors);
                    PipelineStats::bump(&self.stats.treasures_lost);
                    debug!(%treasure, %err, "cash failed");
                }
            }
        }
    }
}
