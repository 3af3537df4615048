//! Bounded pool of digging permits shared by concurrent diggers.
//!
//! A permit grants a finite number of digs. The pool hands those uses out
//! one at a time as [`PermitHold`]s. Capacity is counted in *slots*: a slot
//! is taken when an issuer starts buying a permit ([`PermitPool::request_slot`])
//! and is only returned once the purchase fails or the permit it produced
//! has been fully used and every hold on it released. This keeps the number
//! of in-flight plus live permits within the configured bound.
//!
//! # Bookkeeping
//!
//! Each registered permit owns a [`PermitRecord`] with an atomic counter of
//! *unreleased* uses: uses not yet handed out plus holds still outstanding.
//! Taking a hold moves one use from "available" to "outstanding" under the
//! pool lock and leaves the counter alone; when the last available use is
//! taken the permit is evicted from the available set right there. Dropping
//! a hold decrements the counter, and whichever hold takes it to zero purges
//! the permit and frees its slot. Purging an already-purged permit is a
//! no-op.

use std::collections::{HashMap, HashSet};
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prospector_types::PermitId;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Contract violations when registering a permit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The id was registered before (live, held, or already purged).
    #[error("permit {id} already registered")]
    DuplicatePermit {
        /// Offending permit id.
        id: PermitId,
    },

    /// A permit must grant at least one use.
    #[error("permit {id} registered with {uses} uses")]
    InvalidUses {
        /// Offending permit id.
        id: PermitId,
        /// Uses that were offered.
        uses: u64,
    },
}

#[derive(Debug)]
struct PermitRecord {
    id: PermitId,
    unreleased: AtomicU64,
}

#[derive(Debug)]
struct Available {
    remaining: u64,
    record: Arc<PermitRecord>,
}

#[derive(Debug, Default)]
struct PoolState {
    /// In-flight registrations plus permits not yet purged.
    slots_used: usize,
    /// Permits with uses left to hand out.
    available: HashMap<PermitId, Available>,
    /// Permits registered and not yet purged.
    live: HashSet<PermitId>,
    /// Every id ever registered.
    seen: HashSet<PermitId>,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    state: Mutex<PoolState>,
    slot_freed: Notify,
    permit_added: Notify,
}

/// Point-in-time view of the pool for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured slot capacity.
    pub capacity: usize,
    /// Slots currently taken.
    pub slots_used: usize,
    /// Permits registered and not yet purged.
    pub live: usize,
    /// Permits that still have uses to hand out.
    pub available: usize,
    /// Sum of uses not yet handed out.
    pub available_uses: u64,
}

impl PoolStats {
    /// Slots held by purchases that have not resolved yet.
    pub const fn in_flight(&self) -> usize {
        self.slots_used.saturating_sub(self.live)
    }
}

/// Shared handle to the permit pool. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct PermitPool {
    shared: Arc<Shared>,
}

impl PermitPool {
    /// Create a pool allowing at most `capacity` in-flight or live permits.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(PoolState::default()),
                slot_freed: Notify::new(),
                permit_added: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a free slot and reserve it for one permit purchase.
    ///
    /// The returned ticket must be resolved with [`SlotTicket::succeed`] or
    /// [`SlotTicket::fail`]; dropping it unresolved fails it.
    pub async fn request_slot(&self) -> SlotTicket {
        loop {
            let mut freed = pin!(self.shared.slot_freed.notified());
            freed.as_mut().enable();
            {
                let mut state = self.state();
                if state.slots_used < self.shared.capacity {
                    state.slots_used = state.slots_used.saturating_add(1);
                    let more_free = state.slots_used < self.shared.capacity;
                    drop(state);
                    if more_free {
                        self.shared.slot_freed.notify_one();
                    }
                    return SlotTicket {
                        pool: self.clone(),
                        resolved: false,
                    };
                }
            }
            freed.await;
        }
    }

    /// Wait until some permit has a use left, and take one.
    ///
    /// Which permit is chosen among several is unspecified.
    pub async fn acquire_hold(&self) -> PermitHold {
        loop {
            let mut added = pin!(self.shared.permit_added.notified());
            added.as_mut().enable();
            if let Some(record) = self.take_use() {
                return PermitHold {
                    record,
                    pool: self.clone(),
                };
            }
            added.await;
        }
    }

    /// Take one use from any available permit, evicting it if that was the last.
    fn take_use(&self) -> Option<Arc<PermitRecord>> {
        let mut state = self.state();
        let id = state.available.keys().next().copied()?;
        let entry = state.available.get_mut(&id)?;
        entry.remaining = entry.remaining.saturating_sub(1);
        let record = Arc::clone(&entry.record);
        if entry.remaining == 0 {
            state.available.remove(&id);
            debug!(permit_id = %id, "permit exhausted, evicted from available set");
        }
        Some(record)
    }

    fn register(&self, id: PermitId, uses: u64) -> Result<(), PoolError> {
        if uses == 0 {
            return Err(PoolError::InvalidUses { id, uses });
        }
        let mut state = self.state();
        if !state.seen.insert(id) {
            return Err(PoolError::DuplicatePermit { id });
        }
        state.live.insert(id);
        state.available.insert(
            id,
            Available {
                remaining: uses,
                record: Arc::new(PermitRecord {
                    id,
                    unreleased: AtomicU64::new(uses),
                }),
            },
        );
        drop(state);
        debug!(permit_id = %id, uses, "permit registered");
        self.shared.permit_added.notify_waiters();
        Ok(())
    }

    fn release_slot(&self) {
        let mut state = self.state();
        state.slots_used = state.slots_used.saturating_sub(1);
        drop(state);
        self.shared.slot_freed.notify_one();
    }

    fn purge(&self, id: PermitId) {
        let mut state = self.state();
        if !state.live.remove(&id) {
            return;
        }
        if state.available.remove(&id).is_some() {
            warn!(permit_id = %id, "purged permit still had uses available");
        }
        state.slots_used = state.slots_used.saturating_sub(1);
        drop(state);
        debug!(permit_id = %id, "permit purged, slot freed");
        self.shared.slot_freed.notify_one();
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        PoolStats {
            capacity: self.shared.capacity,
            slots_used: state.slots_used,
            live: state.live.len(),
            available: state.available.len(),
            available_uses: state.available.values().map(|a| a.remaining).sum(),
        }
    }
}

/// One reserved slot for a permit purchase in progress.
#[derive(Debug)]
#[must_use = "an unresolved ticket fails when dropped"]
pub struct SlotTicket {
    pool: PermitPool,
    resolved: bool,
}

impl SlotTicket {
    /// Register the purchased permit in the slot.
    ///
    /// On error the slot is released.
    pub fn succeed(mut self, id: PermitId, uses: u64) -> Result<(), PoolError> {
        self.pool.register(id, uses)?;
        self.resolved = true;
        Ok(())
    }

    /// Give the slot back without registering a permit.
    pub fn fail(self) {
        drop(self);
    }
}

impl Drop for SlotTicket {
    fn drop(&mut self) {
        if !self.resolved {
            self.pool.release_slot();
        }
    }
}

/// One checked-out use of a permit.
///
/// Dropping the hold releases it; [`PermitHold::release`] makes that explicit.
#[derive(Debug)]
#[must_use = "dropping a hold releases it immediately"]
pub struct PermitHold {
    record: Arc<PermitRecord>,
    pool: PermitPool,
}

impl PermitHold {
    /// The permit this hold charges against.
    pub fn permit_id(&self) -> PermitId {
        self.record.id
    }

    /// Release the hold.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PermitHold {
    fn drop(&mut self) {
        if self.record.unreleased.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.pool.purge(self.record.id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const SHORT: Duration = Duration::from_millis(30);
    const LONG: Duration = Duration::from_secs(2);

    async fn register(pool: &PermitPool, id: u64, uses: u64) {
        pool.request_slot().await.succeed(PermitId(id), uses).unwrap();
    }

    #[tokio::test]
    async fn slots_are_bounded() {
        let pool = PermitPool::new(2);
        let first = pool.request_slot().await;
        let _second = pool.request_slot().await;
        assert!(timeout(SHORT, pool.request_slot()).await.is_err());
        assert_eq!(pool.stats().in_flight(), 2);

        first.fail();
        let third = timeout(LONG, pool.request_slot()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn dropped_ticket_frees_its_slot() {
        let pool = PermitPool::new(1);
        drop(pool.request_slot().await);
        assert_eq!(pool.stats().slots_used, 0);
        assert!(timeout(LONG, pool.request_slot()).await.is_ok());
    }

    #[tokio::test]
    async fn holds_are_limited_to_granted_uses() {
        let pool = PermitPool::new(4);
        register(&pool, 7, 3).await;

        let holds = [
            pool.acquire_hold().await,
            pool.acquire_hold().await,
            pool.acquire_hold().await,
        ];
        assert!(holds.iter().all(|h| h.permit_id() == PermitId(7)));
        assert!(timeout(SHORT, pool.acquire_hold()).await.is_err());

        let stats = pool.stats();
        assert_eq!(stats.available, 0);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.slots_used, 1);
    }

    #[tokio::test]
    async fn last_release_purges_permit_and_frees_slot() {
        let pool = PermitPool::new(1);
        register(&pool, 1, 2).await;

        let a = pool.acquire_hold().await;
        let b = pool.acquire_hold().await;

        // Exhausted but still held: the slot stays taken.
        assert!(timeout(SHORT, pool.request_slot()).await.is_err());
        a.release();
        assert_eq!(pool.stats().live, 1);
        assert!(timeout(SHORT, pool.request_slot()).await.is_err());

        b.release();
        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.slots_used, 0);

        let ticket = timeout(LONG, pool.request_slot()).await.unwrap();
        ticket.succeed(PermitId(2), 1).unwrap();
        let hold = timeout(LONG, pool.acquire_hold()).await.unwrap();
        assert_eq!(hold.permit_id(), PermitId(2));
    }

    #[tokio::test]
    async fn waiting_digger_wakes_on_registration() {
        let pool = PermitPool::new(2);
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_hold().await.permit_id() })
        };
        tokio::time::sleep(SHORT).await;
        assert!(!waiter.is_finished());

        register(&pool, 9, 1).await;
        let id = timeout(LONG, waiter).await.unwrap().unwrap();
        assert_eq!(id, PermitId(9));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let pool = PermitPool::new(3);
        register(&pool, 5, 1).await;

        let err = pool.request_slot().await.succeed(PermitId(5), 2).unwrap_err();
        assert_eq!(err, PoolError::DuplicatePermit { id: PermitId(5) });
        assert_eq!(pool.stats().slots_used, 1);

        // Still rejected after the permit has been used up and purged.
        pool.acquire_hold().await.release();
        assert_eq!(pool.stats().live, 0);
        let err = pool.request_slot().await.succeed(PermitId(5), 2).unwrap_err();
        assert_eq!(err, PoolError::DuplicatePermit { id: PermitId(5) });
        assert_eq!(pool.stats().slots_used, 0);
    }

    #[tokio::test]
    async fn zero_use_permit_is_rejected() {
        let pool = PermitPool::new(1);
        let err = pool.request_slot().await.succeed(PermitId(1), 0).unwrap_err();
        assert_eq!(
            err,
            PoolError::InvalidUses {
                id: PermitId(1),
                uses: 0
            }
        );
        assert_eq!(pool.stats().slots_used, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_diggers_drain_every_use_exactly_once() {
        const PERMITS: u64 = 20;
        const USES: u64 = 5;
        const DIGGERS: u64 = 10;

        let pool = PermitPool::new(3);

        let issuer = {
            let pool = pool.clone();
            tokio::spawn(async move {
                for id in 0..PERMITS {
                    let ticket = pool.request_slot().await;
                    assert!(pool.stats().slots_used <= 3);
                    ticket.succeed(PermitId(id), USES).unwrap();
                }
            })
        };

        let per_digger = PERMITS * USES / DIGGERS;
        let diggers: Vec<_> = (0..DIGGERS)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let mut taken = Vec::new();
                    for _ in 0..per_digger {
                        let hold = pool.acquire_hold().await;
                        taken.push(hold.permit_id());
                        tokio::task::yield_now().await;
                        hold.release();
                    }
                    taken
                })
            })
            .collect();

        timeout(Duration::from_secs(10), issuer).await.unwrap().unwrap();
        let mut per_permit: HashMap<PermitId, u64> = HashMap::new();
        for digger in diggers {
            for id in timeout(Duration::from_secs(10), digger).await.unwrap().unwrap() {
                *per_permit.entry(id).or_default() += 1;
            }
        }

        assert_eq!(per_permit.len(), 20);
        assert!(per_permit.values().all(|&n| n == USES));
        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.slots_used, 0);
    }
}
