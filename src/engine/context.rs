// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The handle a stage uses to talk back to its pipeline.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::engine::event_bus::{Event, EventBus, EventType};
use crate::engine::identity::StageId;
use crate::engine::pipeline::PipelineCore;
use crate::errors::FrameError;
use crate::frame::{FramePtr, FrameUnit, StreamAdmission};

/// Per-stage view of the owning pipeline.
///
/// Handed to [`crate::traits::Stage::open`] and
/// [`crate::traits::Stage::process`]. The context only holds a weak handle to
/// the pipeline, so a stage that keeps its context around does not keep the
/// pipeline alive; once the pipeline is gone `transmit` returns `false`.
#[derive(Clone)]
pub struct StageContext {
    name: String,
    id: StageId,
    index: usize,
    admission: Arc<StreamAdmission>,
    event_bus: Arc<EventBus>,
    core: Weak<PipelineCore>,
}

impl StageContext {
    pub(crate) fn new(
        name: &str,
        id: StageId,
        index: usize,
        admission: Arc<StreamAdmission>,
        event_bus: Arc<EventBus>,
        core: Weak<PipelineCore>,
    ) -> Self {
        Self {
            name: name.to_string(),
            id,
            index,
            admission,
            event_bus,
            core,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    /// Forward `frame` as output of this stage.
    ///
    /// Self-transmitting stages call this for every frame they emit, EOS
    /// included; source stages call it for the frames they create. Returns
    /// `false` when the pipeline is gone or not running.
    pub fn transmit(&self, frame: &FramePtr) -> bool {
        match self.core.upgrade() {
            Some(core) if core.is_running() => {
                core.transmit(self.index, Arc::clone(frame));
                true
            }
            _ => false,
        }
    }

    /// Post an event on the pipeline's bus; fails while the bus is stopped.
    ///
    /// `Error` and `StreamError` events also reach the pipeline's stream
    /// message observer.
    pub fn post_event(&self, event_type: EventType, stream_id: &str, message: impl Into<String>) -> bool {
        let event = Event::new(event_type, &self.name, message).with_stream(stream_id);
        match self.core.upgrade() {
            Some(core) => core.post_event(event),
            None => self.event_bus.post(event),
        }
    }

    /// Create a frame against the pipeline's admission service
    pub fn create_frame(
        &self,
        stream_id: &str,
        eos: bool,
        payload: Option<FramePtr>,
    ) -> Result<FramePtr, FrameError> {
        FrameUnit::create(&self.admission, stream_id, eos, payload)
    }

    pub fn admission(&self) -> &Arc<StreamAdmission> {
        &self.admission
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("attached", &(self.core.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(name: &str) -> (StageContext, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let ctx = StageContext::new(
            name,
            3,
            0,
            Arc::new(StreamAdmission::with_flow_depth(1)),
            Arc::clone(&bus),
            Weak::new(),
        );
        (ctx, bus)
    }

    #[test]
    fn test_detached_context_cannot_transmit() {
        let (ctx, _bus) = detached("decode");
        assert_eq!(ctx.name(), "decode");
        assert_eq!(ctx.id(), 3);

        let frame = ctx.create_frame("s0", false, None).unwrap();
        assert!(!ctx.transmit(&frame));
    }

    #[test]
    fn test_create_frame_uses_admission() {
        let (ctx, _bus) = detached("decode");
        let frame = ctx.create_frame("s0", false, None).unwrap();
        assert!(ctx.create_frame("s0", false, None).unwrap_err().is_backpressure());
        assert_eq!(ctx.admission().in_flight("s0"), 1);
        drop(frame);
        assert_eq!(ctx.admission().in_flight("s0"), 0);
    }

    #[test]
    fn test_post_event_tags_stage_and_stream() {
        let (ctx, bus) = detached("decode");
        assert!(!ctx.post_event(EventType::Warning, "s0", "not running"));

        bus.start();
        assert!(ctx.post_event(EventType::StreamError, "s0", "bad packet"));
        let event = bus.poll();
        assert_eq!(event.event_type, EventType::StreamError);
        assert_eq!(event.stage_name, "decode");
        assert_eq!(event.stream_id, "s0");
        assert_eq!(event.message, "bad packet");
    }
}
