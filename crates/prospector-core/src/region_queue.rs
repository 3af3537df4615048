//! Bounded max-treasure-first queue of explored regions.
//!
//! Exploration producers push regions that passed the treasure threshold;
//! diggers pop the richest region available. The queue applies backpressure
//! to producers above a high-water mark, while background pre-exploration
//! bypasses it with [`RegionQueue::push_non_blocking`].
//!
//! One lock guards the heap. Two [`Notify`] signals gate producers
//! ("not full") and consumers ("not empty"). A waiter that finds the queue
//! still has work or room for the next waiter passes the wake-up along, so
//! batched pushes or pops never strand a sleeper.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use prospector_types::Region;
use tokio::sync::Notify;

/// Heap entry ordered by treasure count only.
#[derive(Debug)]
struct ByTreasure(Region);

impl PartialEq for ByTreasure {
    fn eq(&self, other: &Self) -> bool {
        self.0.treasure_count == other.0.treasure_count
    }
}

impl Eq for ByTreasure {}

impl PartialOrd for ByTreasure {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByTreasure {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.treasure_count.cmp(&other.0.treasure_count)
    }
}

/// Max-heap of regions with producer backpressure.
#[derive(Debug)]
pub struct RegionQueue {
    heap: Mutex<BinaryHeap<ByTreasure>>,
    high_water: usize,
    not_full: Notify,
    not_empty: Notify,
}

impl RegionQueue {
    /// Create an empty queue. Blocking pushes wait while it holds more than
    /// `high_water` regions.
    pub fn new(high_water: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            high_water,
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<ByTreasure>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a region, waiting while the queue is above its high-water mark.
    pub async fn push(&self, region: Region) {
        loop {
            let mut not_full = pin!(self.not_full.notified());
            not_full.as_mut().enable();
            {
                let mut heap = self.heap();
                if heap.len() <= self.high_water {
                    let was_empty = heap.is_empty();
                    heap.push(ByTreasure(region));
                    let room_left = heap.len() <= self.high_water;
                    drop(heap);
                    if was_empty {
                        self.not_empty.notify_one();
                    }
                    if room_left {
                        self.not_full.notify_one();
                    }
                    return;
                }
            }
            not_full.await;
        }
    }

    /// Push a region regardless of the high-water mark.
    pub fn push_non_blocking(&self, region: Region) {
        let mut heap = self.heap();
        let was_empty = heap.is_empty();
        heap.push(ByTreasure(region));
        drop(heap);
        if was_empty {
            self.not_empty.notify_one();
        }
    }

    /// Remove and return the region with the most treasure, waiting until
    /// one is available. Ties are broken arbitrarily.
    pub async fn pop(&self) -> Region {
        loop {
            let mut not_empty = pin!(self.not_empty.notified());
            not_empty.as_mut().enable();
            {
                let mut heap = self.heap();
                let prev_len = heap.len();
                if let Some(ByTreasure(region)) = heap.pop() {
                    let remaining = heap.len();
                    drop(heap);
                    if remaining > 0 {
                        self.not_empty.notify_one();
                    }
                    if prev_len > self.high_water {
                        self.not_full.notify_one();
                    }
                    return region;
                }
            }
            not_empty.await;
        }
    }

    /// Advisory snapshot of the number of queued regions.
    pub fn size(&self) -> usize {
        self.heap().len()
    }

    /// The configured high-water mark.
    pub const fn high_water(&self) -> usize {
        self.high_water
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn region(treasures: u64) -> Region {
        Region::new(0, 0, 1, 1).with_treasures(treasures)
    }

    #[tokio::test]
    async fn pop_returns_richest_region() {
        let queue = RegionQueue::new(10);
        for t in [3, 7, 5, 1, 9] {
            queue.push(region(t)).await;
        }
        let mut popped = Vec::new();
        for _ in 0..5 {
            popped.push(queue.pop().await.treasure_count);
        }
        assert_eq!(popped, vec![9, 7, 5, 3, 1]);
        assert_eq!(queue.size(), 0);
    }

    #[tokio::test]
    async fn pop_blocks_until_next_push() {
        let queue = Arc::new(RegionQueue::new(10));
        assert!(timeout(Duration::from_millis(30), queue.pop()).await.is_err());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(region(4)).await;

        let popped = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(popped.treasure_count, 4);
    }

    #[tokio::test]
    async fn push_blocks_above_high_water() {
        let queue = Arc::new(RegionQueue::new(2));
        assert_eq!(queue.high_water(), 2);
        // Three pushes fit: the third takes the queue one over the mark.
        for t in 1..=3 {
            queue.push(region(t)).await;
        }
        assert_eq!(queue.size(), 3);

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(region(10)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.size(), 3);

        assert_eq!(queue.pop().await.treasure_count, 3);
        timeout(Duration::from_secs(1), producer).await.unwrap().unwrap();
        assert_eq!(queue.size(), 3);
        assert_eq!(queue.pop().await.treasure_count, 10);
    }

    #[tokio::test]
    async fn non_blocking_push_ignores_high_water() {
        let queue = RegionQueue::new(1);
        for t in 0..10 {
            queue.push_non_blocking(region(t));
        }
        assert_eq!(queue.size(), 10);
        assert_eq!(queue.pop().await.treasure_count, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_consumers_conserve_regions() {
        let queue = Arc::new(RegionQueue::new(4));
        let mut producers = Vec::new();
        for p in 0..4_u64 {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for i in 0..50_u64 {
                    queue.push(region(p * 100 + i)).await;
                }
            }));
        }
        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut sum = 0_u64;
                for _ in 0..50 {
                    let r = queue.pop().await;
                    sum += r.treasure_count;
                }
                sum
            }));
        }
        for p in producers {
            timeout(Duration::from_secs(5), p).await.unwrap().unwrap();
        }
        let mut consumed = 0_u64;
        for c in consumers {
            consumed += timeout(Duration::from_secs(5), c).await.unwrap().unwrap();
        }
        let produced: u64 = (0..4_u64)
            .flat_map(|p| (0..50_u64).map(move |i| p * 100 + i))
            .sum();
        assert_eq!(consumed, produced);
        assert_eq!(queue.size(), 0);
    }
}
