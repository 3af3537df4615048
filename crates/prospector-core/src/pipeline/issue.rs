//! Permit-issuing workers.
//!
//! Each pass reserves a pool slot first, so purchases never outrun the
//! permit bound, then spends at most the current price ceiling. Coins go
//! back to the wallet when a purchase fails.

use std::sync::Arc;

use tracing::{debug, warn};

use super::Pipeline;
use crate::api::GameApi;
use crate::stats::PipelineStats;

impl<A: GameApi> Pipeline<A> {
    pub(super) async fn issuer(self: Arc<Self>) {
        let backoff = self.config.pricing.failure_backoff();
        loop {
            let ticket = self.permits.request_slot().await;
            let ceiling = self.prices.price();
            let mut offer = self.offers.next(ceiling);
            let coins = self
                .wallet
                .withdraw(usize::try_from(offer.coins_amount).unwrap_or(usize::MAX));
            offer.real_amount = coins.len() as u64;

            let license = match self.api.issue_license(&coins).await {
                Ok(license) => license,
                Err(err) => {
                    offer.failed = true;
                    self.offers.commit(&offer);
                    self.wallet.deposit(coins);
                    ticket.fail();
                    PipelineStats::bump(&self.stats.permits_failed);
                    debug!(amount = offer.real_amount, %err, "permit purchase failed");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            self.prices.delete_coins(offer.real_amount);
            PipelineStats::add(&self.stats.coins_spent, offer.real_amount);
            offer.permit_uses = license.digs_remaining();
            self.offers.commit(&offer);

            if offer.permit_uses == 0 {
                ticket.fail();
                PipelineStats::bump(&self.stats.permits_failed);
                debug!(permit_id = %license.id, "permit granted no digs");
                continue;
            }
            match ticket.succeed(license.id, offer.permit_uses) {
                Ok(()) => {
                    PipelineStats::bump(&self.stats.permits_issued);
                    debug!(
                        permit_id = %license.id,
                        digs = offer.permit_uses,
                        amount = offer.real_amount,
                        experimental = offer.is_experimental(),
                        "permit issued"
                    );
                }
                Err(err) => {
                    PipelineStats::bump(&self.stats.permits_failed);
                    warn!(%err, "permit registration rejected");
                }
            }
        }
    }
}
