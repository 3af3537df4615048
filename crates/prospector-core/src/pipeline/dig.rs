//! Digging workers.
//!
//! A digger pops the richest queued region and splits it in two
//! concurrent halves joined by a short channel: a scanner explores the
//! region cell by cell (row-major) until the reported treasure has been
//! located, and the digger proper works through the located cells depth by
//! depth. The permit hold survives across cells and regions until a dig
//! actually consumes it.

use std::sync::Arc;

use prospector_types::{Area, Cell, PermitId, Region, TreasureId};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::Pipeline;
use crate::api::{ApiError, GameApi};
use crate::permit_pool::PermitHold;
use crate::stats::PipelineStats;

/// What the cell loop does after one dig attempt.
enum Step {
    /// Go one level deeper.
    Deeper,
    /// Try the same depth again.
    Retry,
    /// Leave the cell.
    Stop,
}

impl<A: GameApi> Pipeline<A> {
    pub(super) async fn digger(self: Arc<Self>, treasures: mpsc::Sender<TreasureId>) {
        let mut hold = None;
        loop {
            let region = self.queue.pop().await;
            if region.treasure_count == 0 {
                continue;
            }
            let (cell_tx, cell_rx) = mpsc::channel(self.config.queue.cell_lookahead.max(1));
            tokio::join!(
                self.scan_region(region, cell_tx),
                self.dig_cells(cell_rx, &mut hold, &treasures),
            );
        }
    }

    /// Explore each cell of `region` until its reported treasure is accounted for.
    async fn scan_region(&self, region: Region, cells: mpsc::Sender<Cell>) {
        let mut unlocated = region.treasure_count;
        for (x, y) in region.cells() {
            if unlocated == 0 {
                break;
            }
            match self.api.explore(Area::cell(x, y)).await {
                Ok(report) => {
                    PipelineStats::bump(&self.stats.explore_ok);
                    if report.amount == 0 {
                        continue;
                    }
                    unlocated = unlocated.saturating_sub(report.amount);
                    let cell = Cell {
                        x,
                        y,
                        treasures: report.amount,
                    };
                    if cells.send(cell).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    PipelineStats::bump(&self.stats.explore_errors);
                    debug!(x, y, %err, "cell explore failed");
                }
            }
        }
    }

    async fn dig_cells(
        &self,
        mut cells: mpsc::Receiver<Cell>,
        hold: &mut Option<PermitHold>,
        treasures: &mpsc::Sender<TreasureId>,
    ) {
        while let Some(cell) = cells.recv().await {
            self.dig_cell(cell, hold, treasures).await;
        }
    }

    /// Dig one cell from depth 1 down to the depth the optimizer picks.
    async fn dig_cell(
        &self,
        cell: Cell,
        hold: &mut Option<PermitHold>,
        treasures: &mpsc::Sender<TreasureId>,
    ) {
        let max_depth = self.depth.next();
        let mut left = cell.treasures;
        let mut depth = 1_u32;
        while depth <= max_depth && left > 0 {
            let permit = self.ensure_hold(hold).await;
            let started = Instant::now();
            let outcome = self.api.dig(cell.x, cell.y, depth, permit).await;
            let elapsed = started.elapsed();

            let step = match outcome {
                Ok(found) => {
                    PipelineStats::bump(&self.stats.dig_ok);
                    release(hold);
                    let count = found.len() as u64;
                    self.depth.register(depth, count, elapsed);
                    left = left.saturating_sub(count);
                    PipelineStats::add(&self.stats.treasures_found, count);
                    for treasure in found {
                        if treasures.send(treasure).await.is_err() {
                            PipelineStats::bump(&self.stats.treasures_lost);
                        }
                    }
                    Step::Deeper
                }
                Err(ApiError::TreasureNotFound) => {
                    PipelineStats::bump(&self.stats.dig_empty);
                    release(hold);
                    self.depth.register(depth, 0, elapsed);
                    Step::Deeper
                }
                Err(ApiError::NoSuchLicense) => {
                    PipelineStats::bump(&self.stats.dig_no_license);
                    debug!(permit_id = %permit, "permit rejected, reacquiring");
                    release(hold);
                    Step::Retry
                }
                Err(ApiError::WrongDepth) => {
                    PipelineStats::bump(&self.stats.dig_wrong_depth);
                    self.stats.observe_max_depth(depth.saturating_sub(1));
                    release(hold);
                    Step::Stop
                }
                Err(ApiError::WrongCoordinates) => {
                    PipelineStats::bump(&self.stats.dig_wrong_coordinates);
                    warn!(x = cell.x, y = cell.y, "dig rejected coordinates, abandoning cell");
                    Step::Stop
                }
                Err(err) => {
                    PipelineStats::bump(&self.stats.dig_errors);
                    debug!(x = cell.x, y = cell.y, depth, %err, "dig failed");
                    Step::Retry
                }
            };

            match step {
                Step::Deeper => depth = depth.saturating_add(1),
                Step::Retry => {}
                Step::Stop => break,
            }
        }
        if left > 0 {
            PipelineStats::add(&self.stats.treasures_lost, left);
        }
    }

    /// Permit of the current hold, acquiring a new hold if there is none.
    async fn ensure_hold(&self, hold: &mut Option<PermitHold>) -> PermitId {
        if let Some(current) = hold {
            return current.permit_id();
        }
        let acquired = self.permits.acquire_hold().await;
        let permit = acquired.permit_id();
        *hold = Some(acquired);
        permit
    }
}

fn release(hold: &mut Option<PermitHold>) {
    if let Some(hold) = hold.take() {
        hold.release();
    }
}
