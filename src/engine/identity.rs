// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage identities and the fixed-width visited mask.
//!
//! Every stage of a pipeline leases a small integer id from a
//! [`StageIdentityPool`]. The id doubles as a bit position in a [`StageMask`],
//! which frames carry to record the stages they have passed through. Testing
//! "has this frame visited stage X" is then a single AND.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::config::consts::MAX_STAGES;

/// Identifier of a stage inside one pipeline, in `0..MAX_STAGES`
pub type StageId = usize;

/// Fixed-width set of stage ids.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StageMask(u64);

impl StageMask {
    pub const EMPTY: StageMask = StageMask(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Mask holding only `id`; empty when `id` is out of range
    pub fn of(id: StageId) -> Self {
        if id >= MAX_STAGES {
            return Self::EMPTY;
        }
        Self(1u64 << id)
    }

    pub fn with(self, id: StageId) -> Self {
        Self(self.0 | Self::of(id).0)
    }

    pub fn without(self, id: StageId) -> Self {
        Self(self.0 & !Self::of(id).0)
    }

    pub fn contains(self, id: StageId) -> bool {
        id < MAX_STAGES && self.0 & (1u64 << id) != 0
    }

    /// True when every bit of `other` is also set in `self`
    pub fn covers(self, other: StageMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: StageMask) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Debug for StageMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageMask({:#066b})", self.0)
    }
}

/// Allocator handing out the lowest free stage id.
#[derive(Debug, Default)]
pub struct StageIdentityPool {
    mask: Mutex<u64>,
}

impl StageIdentityPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve the lowest free id, or `None` when all `MAX_STAGES` are taken
    pub fn acquire(&self) -> Option<StageId> {
        let mut mask = self.mask.lock();
        let id = (0..MAX_STAGES).find(|i| *mask & (1u64 << i) == 0)?;
        *mask |= 1u64 << id;
        Some(id)
    }

    /// Return an id to the pool; out-of-range ids are ignored
    pub fn release(&self, id: StageId) {
        if id >= MAX_STAGES {
            return;
        }
        *self.mask.lock() &= !(1u64 << id);
    }

    /// Reserve an id that is released again when the lease is dropped
    pub fn lease(self: &Arc<Self>) -> Option<StageIdLease> {
        self.acquire().map(|id| StageIdLease {
            id,
            pool: Arc::clone(self),
        })
    }

    pub fn in_use(&self) -> StageMask {
        StageMask(*self.mask.lock())
    }
}

/// A stage id held for the lifetime of a stage
#[derive(Debug)]
pub struct StageIdLease {
    id: StageId,
    pool: Arc<StageIdentityPool>,
}

impl StageIdLease {
    pub fn id(&self) -> StageId {
        self.id
    }
}

impl Drop for StageIdLease {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}
