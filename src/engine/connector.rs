// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The set of conveyors feeding every parallel worker of one stage.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::conveyor::{Conveyor, EvictionFilter, OverflowPolicy};

/// One [`Conveyor`] per downstream worker.
///
/// Slot-indexed operations return `false`/`None`/`0` for slots that do not
/// exist. Use [`Connector::slot_for`] to route all items of one stream to
/// the same slot, which keeps per-stream ordering intact.
#[derive(Debug)]
pub struct Connector<T> {
    conveyors: Vec<Conveyor<T>>,
    stopped: AtomicBool,
}

impl<T> Connector<T> {
    /// Create `conveyor_count` conveyors (minimum 1) of `capacity` each
    pub fn new(conveyor_count: usize, capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_eviction_filter(conveyor_count, capacity, policy, |_| true)
    }

    /// Like [`Connector::new`], with `evictable` applied by every conveyor
    pub fn with_eviction_filter(
        conveyor_count: usize,
        capacity: usize,
        policy: OverflowPolicy,
        evictable: EvictionFilter<T>,
    ) -> Self {
        let conveyors = (0..conveyor_count.max(1))
            .map(|_| Conveyor::with_eviction_filter(capacity, policy, evictable))
            .collect();
        Self {
            conveyors,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn conveyor_count(&self) -> usize {
        self.conveyors.len()
    }

    pub fn conveyor(&self, slot: usize) -> Option<&Conveyor<T>> {
        self.conveyors.get(slot)
    }

    /// Stable slot for `key`: every call with the same key picks the same conveyor
    pub fn slot_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.conveyors.len() as u64) as usize
    }

    pub fn push(&self, slot: usize, item: T) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.conveyor(slot).map(|c| c.push(item)).unwrap_or(false)
    }

    pub fn pop(&self, slot: usize) -> Option<T> {
        if self.is_stopped() {
            return None;
        }
        self.conveyor(slot).and_then(|c| c.pop())
    }

    pub fn pop_all(&self, slot: usize) -> Vec<T> {
        self.conveyor(slot).map(|c| c.pop_all()).unwrap_or_default()
    }

    pub fn size(&self, slot: usize) -> usize {
        self.conveyor(slot).map(|c| c.size()).unwrap_or(0)
    }

    /// Queue sizes of every slot
    pub fn sizes(&self) -> Vec<usize> {
        self.conveyors.iter().map(|c| c.size()).collect()
    }

    pub fn is_full(&self, slot: usize) -> bool {
        self.conveyor(slot).map(|c| c.is_full()).unwrap_or(false)
    }

    pub fn is_empty(&self, slot: usize) -> bool {
        self.conveyor(slot).map(|c| c.is_empty()).unwrap_or(true)
    }

    pub fn fail_time(&self, slot: usize) -> Option<Instant> {
        self.conveyor(slot).and_then(|c| c.fail_time())
    }

    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
        for conveyor in &self.conveyors {
            conveyor.start();
        }
    }

    /// Stop every conveyor; blocked pops and pushes return immediately
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        for conveyor in &self.conveyors {
            conveyor.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Drain every conveyor, returning what was still queued
    pub fn empty_data_queue(&self) -> Vec<T> {
        self.conveyors.iter().flat_map(|c| c.pop_all()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_one_conveyor_per_worker() {
        let connector: Connector<u32> = Connector::new(4, 8, OverflowPolicy::Block);
        assert_eq!(connector.conveyor_count(), 4);
        assert_eq!(connector.conveyor(3).map(|c| c.capacity()), Some(8));
        assert!(connector.conveyor(4).is_none());

        let connector: Connector<u32> = Connector::new(0, 8, OverflowPolicy::Block);
        assert_eq!(connector.conveyor_count(), 1);
    }

    #[test]
    fn test_slot_for_is_stable_and_in_range() {
        let connector: Connector<u32> = Connector::new(3, 4, OverflowPolicy::Block);
        for stream in ["s0", "s1", "cam-17", "rtsp://host/stream"] {
            let slot = connector.slot_for(stream);
            assert!(slot < 3);
            for _ in 0..10 {
                assert_eq!(connector.slot_for(stream), slot);
            }
        }
    }

    #[test]
    fn test_slots_are_independent() {
        let connector = Connector::new(2, 2, OverflowPolicy::DropOldest);
        connector.push(0, "a");
        connector.push(0, "b");
        connector.push(0, "c");
        connector.push(1, "x");

        assert!(connector.is_full(0));
        assert!(!connector.is_full(1));
        assert!(connector.fail_time(0).is_some());
        assert!(connector.fail_time(1).is_none());
        assert_eq!(connector.sizes(), vec![2, 1]);

        assert_eq!(connector.pop_all(0), vec!["b", "c"]);
        assert_eq!(connector.pop(1), Some("x"));
        assert!(connector.is_empty(1));
    }

    #[test]
    fn test_invalid_slot() {
        let connector = Connector::new(1, 2, OverflowPolicy::Block);
        assert!(!connector.push(5, 1u8));
        assert_eq!(connector.size(5), 0);
        assert!(connector.is_empty(5));
        assert!(connector.pop_all(5).is_empty());
    }

    #[test]
    fn test_stop_unblocks_all_workers() {
        let connector: Arc<Connector<u32>> = Arc::new(Connector::new(3, 4, OverflowPolicy::Block));
        let workers: Vec<_> = (0..3)
            .map(|slot| {
                let connector = Arc::clone(&connector);
                thread::spawn(move || connector.pop(slot))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        connector.stop();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), None);
        }

        assert!(connector.is_stopped());
        assert!(!connector.push(0, 1));
    }

    #[test]
    fn test_empty_data_queue_after_stop() {
        let connector = Connector::new(2, 4, OverflowPolicy::Block);
        connector.push(0, 1);
        connector.push(1, 2);
        connector.push(1, 3);
        connector.stop();

        let mut drained = connector.empty_data_queue();
        drained.sort();
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(connector.sizes(), vec![0, 0]);

        connector.start();
        assert!(connector.push(0, 4));
        assert_eq!(connector.pop(0), Some(4));
    }
}
