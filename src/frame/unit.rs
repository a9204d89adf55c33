// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The unit of work flowing through a pipeline.
//!
//! A [`FrameUnit`] is created through [`FrameUnit::create`], which asks the
//! [`StreamAdmission`] service for permission, and is shared between stages as
//! a [`FramePtr`]. When the last handle is dropped the unit gives its
//! admission slot back, or, for an end-of-stream unit, marks the stream's EOS
//! as reached.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use the_streamline::frame::{FrameUnit, StreamAdmission};
//!
//! let admission = Arc::new(StreamAdmission::with_flow_depth(1));
//! let frame = FrameUnit::create(&admission, "cam-0", false, None).unwrap();
//! assert!(FrameUnit::create(&admission, "cam-0", false, None).is_err());
//!
//! drop(frame);
//! assert!(FrameUnit::create(&admission, "cam-0", false, None).is_ok());
//! ```

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::engine::identity::{StageId, StageMask};
use crate::errors::FrameError;
use crate::frame::StreamAdmission;

/// Shared handle to a frame unit
pub type FramePtr = Arc<FrameUnit>;

/// Flags carried by a frame unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameFlag {
    /// Last unit of a stream
    Eos = 1 << 0,
    /// The unit is broken and must not be forwarded
    Invalid = 1 << 1,
    /// The stream this unit belongs to has been removed
    Removed = 1 << 2,
}

/// Typed key/value store for user data attached to a frame.
#[derive(Default)]
pub struct Collection {
    items: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Collection {
    /// Insert or replace the value stored under `key`
    pub(crate) fn insert<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.items.lock().insert(key.to_string(), Box::new(value));
    }

    /// Clone out the value stored under `key` if it has type `T`
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.items
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Run `f` against the value stored under `key` without cloning it
    pub fn with<T: Any, R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let items = self.items.lock();
        items.get(key).and_then(|v| v.downcast_ref::<T>()).map(f)
    }

    /// Take the value stored under `key` out of the collection
    pub fn remove<T: Any>(&self, key: &str) -> Option<T> {
        let mut items = self.items.lock();
        if !items.get(key).map(|v| v.is::<T>()).unwrap_or(false) {
            return None;
        }
        items
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items = self.items.lock();
        f.debug_struct("Collection")
            .field("keys", &items.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct FrameUnit {
    stream_id: String,
    timestamp: AtomicI64,
    flags: AtomicU8,
    visited: AtomicU64,
    payload: Option<FramePtr>,
    collection: Collection,
    admission: Arc<StreamAdmission>,
}

impl FrameUnit {
    /// Create a frame for `stream_id`.
    ///
    /// Ordinary frames must be admitted by `admission`; once the stream holds
    /// its flow depth of frames the call fails with
    /// [`FrameError::FlowDepthReached`]. An EOS frame without payload
    /// registers a pending EOS marker for the stream instead.
    ///
    /// `payload` wraps a unit of an enclosing pipeline; the new frame owns it
    /// until the new frame itself is dropped.
    pub fn create(
        admission: &Arc<StreamAdmission>,
        stream_id: &str,
        eos: bool,
        payload: Option<FramePtr>,
    ) -> Result<FramePtr, FrameError> {
        if stream_id.is_empty() {
            return Err(FrameError::EmptyStreamId);
        }

        if eos {
            if payload.is_none() {
                admission.mark_eos_pending(stream_id);
            }
        } else if !admission.admit(stream_id) {
            return Err(FrameError::FlowDepthReached {
                stream_id: stream_id.to_string(),
                flow_depth: admission.flow_depth(),
            });
        }

        let flags = if eos { FrameFlag::Eos as u8 } else { 0 };
        Ok(Arc::new(FrameUnit {
            stream_id: stream_id.to_string(),
            timestamp: AtomicI64::new(-1),
            flags: AtomicU8::new(flags),
            visited: AtomicU64::new(0),
            payload,
            collection: Collection::default(),
            admission: Arc::clone(admission),
        }))
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub fn set_timestamp(&self, timestamp: i64) {
        self.timestamp.store(timestamp, Ordering::Release);
    }

    pub fn has_flag(&self, flag: FrameFlag) -> bool {
        self.flags.load(Ordering::Acquire) & flag as u8 != 0
    }

    /// Set `flag`; the EOS flag is fixed at creation and cannot be added later
    pub fn set_flag(&self, flag: FrameFlag) {
        if flag == FrameFlag::Eos {
            return;
        }
        self.flags.fetch_or(flag as u8, Ordering::AcqRel);
    }

    pub fn is_eos(&self) -> bool {
        self.has_flag(FrameFlag::Eos)
    }

    pub fn is_invalid(&self) -> bool {
        self.has_flag(FrameFlag::Invalid)
    }

    pub fn is_removed(&self) -> bool {
        self.has_flag(FrameFlag::Removed)
    }

    /// The wrapped unit of an enclosing pipeline, if any
    pub fn payload(&self) -> Option<&FramePtr> {
        self.payload.as_ref()
    }

    /// User data attached to the frame.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Attach user data, refused on payload-less EOS frames which carry none
    pub fn insert_data<T: Any + Send + Sync>(&self, key: &str, value: T) -> bool {
        if self.is_eos() && self.payload.is_none() {
            return false;
        }
        self.collection.insert(key, value);
        true
    }

    /// Stages this frame has passed through
    pub fn visited(&self) -> StageMask {
        StageMask::from_bits(self.visited.load(Ordering::Acquire))
    }

    pub(crate) fn set_visited(&self, mask: StageMask) {
        self.visited.store(mask.bits(), Ordering::Release);
    }

    /// Mark `id` as visited and return the masks before and after the change.
    ///
    /// Two parents racing to mark the same frame each see a distinct
    /// `(before, after)` pair, so exactly one of them observes the transition
    /// that completes a fan-in.
    pub(crate) fn mark_visited(&self, id: StageId) -> (StageMask, StageMask) {
        let bit = StageMask::of(id).bits();
        let before = self.visited.fetch_or(bit, Ordering::AcqRel);
        (StageMask::from_bits(before), StageMask::from_bits(before | bit))
    }
}

impl Drop for FrameUnit {
    fn drop(&mut self) {
        if self.is_eos() {
            if self.payload.is_none() {
                self.admission.mark_eos_reached(&self.stream_id);
            }
        } else {
            self.admission.release(&self.stream_id);
        }
    }
}

impl fmt::Debug for FrameUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameUnit")
            .field("stream_id", &self.stream_id)
            .field("timestamp", &self.timestamp())
            .field("eos", &self.is_eos())
            .field("invalid", &self.is_invalid())
            .field("removed", &self.is_removed())
            .field("visited", &self.visited())
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}
