// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded FIFO feeding one worker of a stage.
//!
//! A [`Conveyor`] is the only place frames cross threads: upstream workers
//! push, the single downstream worker owning the slot pops. Each conveyor
//! carries its own lock so pushes to different workers never contend.
//!
//! What happens when a push meets a full queue is decided by the
//! [`OverflowPolicy`] fixed at construction:
//!
//! * [`OverflowPolicy::Block`] (default) parks the pusher until the consumer
//!   frees a slot or the conveyor is stopped;
//! * [`OverflowPolicy::DropOldest`] evicts the oldest evictable item, appends
//!   the new item and records the time of the failure. Under sustained
//!   overload the consumer always sees the freshest items. Items rejected by
//!   the conveyor's eviction filter (see [`Conveyor::with_eviction_filter`])
//!   are never evicted; a push meeting a queue full of them waits as under
//!   `Block`.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

use crate::config::consts::DEFAULT_QUEUE_CAPACITY;

/// Behaviour of [`Conveyor::push`] on a full queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the consumer to free a slot
    #[default]
    Block,
    /// Evict the oldest queued item to make room
    DropOldest,
}

/// Decides whether a queued item may be evicted by a drop-oldest push
pub type EvictionFilter<T> = fn(&T) -> bool;

struct ConveyorState<T> {
    items: VecDeque<T>,
    stopped: bool,
    last_fail: Option<Instant>,
    drop_count: u64,
}

pub struct Conveyor<T> {
    capacity: usize,
    policy: OverflowPolicy,
    evictable: EvictionFilter<T>,
    state: Mutex<ConveyorState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Conveyor<T> {
    /// Create a conveyor holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_eviction_filter(capacity, policy, |_| true)
    }

    /// Create a conveyor whose drop-oldest pushes only evict items accepted by `evictable`
    pub fn with_eviction_filter(
        capacity: usize,
        policy: OverflowPolicy,
        evictable: EvictionFilter<T>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            evictable,
            state: Mutex::new(ConveyorState {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
                last_fail: None,
                drop_count: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Append `item`.
    ///
    /// Returns `false` without queueing when the conveyor is stopped, either
    /// before the call or while a blocking push was waiting for room.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        let mut evicted = None;

        if state.stopped {
            return false;
        }

        while state.items.len() >= self.capacity {
            if self.policy == OverflowPolicy::DropOldest {
                let evictable = self.evictable;
                if let Some(position) = state.items.iter().position(|queued| evictable(queued)) {
                    evicted = state.items.remove(position);
                    state.last_fail = Some(Instant::now());
                    state.drop_count += 1;
                    break;
                }
            }
            self.not_full.wait(&mut state);
            if state.stopped {
                return false;
            }
        }

        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();

        // The evicted item may own resources with their own locks; release it
        // outside the queue lock.
        drop(evicted);
        true
    }

    /// Take the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the conveyor is stopped.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Drain every queued item in push order without blocking
    pub fn pop_all(&self) -> Vec<T> {
        let drained: Vec<T> = self.state.lock().items.drain(..).collect();
        self.not_full.notify_all();
        drained
    }

    pub fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// When a drop-oldest push last had to evict an item
    pub fn fail_time(&self) -> Option<Instant> {
        self.state.lock().last_fail
    }

    /// Number of items evicted by drop-oldest pushes
    pub fn drop_count(&self) -> u64 {
        self.state.lock().drop_count
    }

    pub fn start(&self) {
        self.state.lock().stopped = false;
    }

    /// Stop the conveyor and wake every blocked `push` and `pop`
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl<T> Default for Conveyor<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}

impl<T> std::fmt::Debug for Conveyor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Conveyor")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("size", &state.items.len())
            .field("stopped", &state.stopped)
            .field("drop_count", &state.drop_count)
            .finish()
    }
}
