// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-stream admission counters and end-of-stream bookkeeping.
//!
//! `StreamAdmission` is the service object behind frame creation:
//!
//! * every ordinary frame is admitted against a per-stream counter which is
//!   capped by the configured flow depth (0 = unlimited) and released when the
//!   frame is dropped;
//! * every payload-less EOS frame registers a pending marker which flips to
//!   "reached" when the frame is dropped, i.e. once it has left the graph;
//! * streams can be flagged as removed so stages stop processing them while
//!   EOS still drains through the graph.
//!
//! All maps sit behind coarse locks: admission decisions happen once per frame
//! creation and release, never inside a stage's `process` call.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::config::consts::{EOS_POLL_INTERVAL, UNLIMITED_FLOW_DEPTH};

#[derive(Debug, Default)]
pub struct StreamAdmission {
    flow_depth: AtomicUsize,
    in_flight: Mutex<HashMap<String, usize>>,
    eos: Mutex<HashMap<String, bool>>,
    removed: Mutex<HashMap<String, bool>>,
}

impl StreamAdmission {
    /// Create an admission service with unlimited flow depth
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an admission service capping each stream at `flow_depth` in-flight frames
    pub fn with_flow_depth(flow_depth: usize) -> Self {
        let admission = Self::default();
        admission.set_flow_depth(flow_depth);
        admission
    }

    pub fn set_flow_depth(&self, flow_depth: usize) {
        self.flow_depth.store(flow_depth, Ordering::Release);
    }

    pub fn flow_depth(&self) -> usize {
        self.flow_depth.load(Ordering::Acquire)
    }

    /// Try to admit one more frame for `stream_id`.
    ///
    /// Returns `false` once the stream already holds `flow_depth` frames.
    pub fn admit(&self, stream_id: &str) -> bool {
        let cap = self.flow_depth();
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.entry(stream_id.to_string()).or_insert(0);
        if cap != UNLIMITED_FLOW_DEPTH && *count >= cap {
            return false;
        }
        *count += 1;
        true
    }

    /// Give back one admitted frame; the entry is erased when it reaches zero
    pub fn release(&self, stream_id: &str) {
        let mut in_flight = self.in_flight.lock();
        if let Some(count) = in_flight.get_mut(stream_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(stream_id);
            }
        }
    }

    /// Number of frames currently admitted for `stream_id`
    pub fn in_flight(&self, stream_id: &str) -> usize {
        self.in_flight.lock().get(stream_id).copied().unwrap_or(0)
    }

    /// Register a pending EOS for `stream_id` (not yet reached)
    pub fn mark_eos_pending(&self, stream_id: &str) {
        self.eos.lock().insert(stream_id.to_string(), false);
    }

    /// Flip the pending EOS of `stream_id` to reached
    pub(crate) fn mark_eos_reached(&self, stream_id: &str) {
        self.eos.lock().insert(stream_id.to_string(), true);
    }

    /// Check whether the EOS of `stream_id` has left the graph.
    ///
    /// A reached marker is consumed by this call, so a second query without a
    /// new EOS returns `false`. With `blocking` set the call keeps polling
    /// while a marker is pending and returns `false` right away if none exists.
    pub fn reached_eos(&self, stream_id: &str, blocking: bool) -> bool {
        loop {
            {
                let mut eos = self.eos.lock();
                match eos.get(stream_id) {
                    Some(true) => {
                        eos.remove(stream_id);
                        return true;
                    }
                    Some(false) if blocking => {}
                    _ => return false,
                }
            }
            thread::sleep(EOS_POLL_INTERVAL);
        }
    }

    /// Flag or unflag a stream as removed. Unflagging erases the entry.
    pub fn set_removed(&self, stream_id: &str, value: bool) {
        let mut removed = self.removed.lock();
        if value {
            removed.insert(stream_id.to_string(), true);
        } else {
            removed.remove(stream_id);
        }
    }

    pub fn is_removed(&self, stream_id: &str) -> bool {
        self.removed.lock().get(stream_id).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_admit_refuses_exactly_at_flow_depth() {
        let admission = StreamAdmission::with_flow_depth(3);

        for _ in 0..3 {
            assert!(admission.admit("s0"));
        }
        assert!(!admission.admit("s0"));
        assert_eq!(admission.in_flight("s0"), 3);

        // Other streams are counted separately
        assert!(admission.admit("s1"));

        admission.release("s0");
        assert!(admission.admit("s0"));
        assert!(!admission.admit("s0"));
    }

    #[test]
    fn test_unlimited_flow_depth() {
        let admission = StreamAdmission::new();
        for _ in 0..1000 {
            assert!(admission.admit("s0"));
        }
        assert_eq!(admission.in_flight("s0"), 1000);
    }

    #[test]
    fn test_release_erases_entry_at_zero() {
        let admission = StreamAdmission::with_flow_depth(2);
        assert!(admission.admit("s0"));
        admission.release("s0");
        assert_eq!(admission.in_flight("s0"), 0);
        assert!(admission.in_flight.lock().get("s0").is_none());

        // Releasing an unknown stream is a no-op
        admission.release("unknown");
        assert!(admission.in_flight.lock().is_empty());
    }

    #[test]
    fn test_reached_eos_is_consumed() {
        let admission = StreamAdmission::new();
        assert!(!admission.reached_eos("s0", false));

        admission.mark_eos_pending("s0");
        assert!(!admission.reached_eos("s0", false));

        admission.mark_eos_reached("s0");
        assert!(admission.reached_eos("s0", false));
        assert!(!admission.reached_eos("s0", false));
    }

    #[test]
    fn test_blocking_reached_eos_without_marker_returns_immediately() {
        let admission = StreamAdmission::new();
        assert!(!admission.reached_eos("nothing", true));
    }

    #[test]
    fn test_blocking_reached_eos_waits_for_marker() {
        let admission = Arc::new(StreamAdmission::new());
        admission.mark_eos_pending("s0");

        let flipper = {
            let admission = Arc::clone(&admission);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(60));
                admission.mark_eos_reached("s0");
            })
        };

        assert!(admission.reached_eos("s0", true));
        flipper.join().unwrap();
    }

    #[test]
    fn test_removed_flags() {
        let admission = StreamAdmission::new();
        assert!(!admission.is_removed("s0"));

        admission.set_removed("s0", true);
        assert!(admission.is_removed("s0"));

        admission.set_removed("s0", false);
        assert!(!admission.is_removed("s0"));
        assert!(admission.removed.lock().is_empty());
    }
}
