// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline lifecycle, workers and the event bus.
//!
//! This module contains message types for logging events related to:
//! * Pipeline start, rollback and stop
//! * Worker thread lifecycle
//! * Data injection at root stages
//! * Streams completing the whole graph
//! * Event bus posts and events seen by the default watcher

use crate::engine::event_bus::{Event, EventType};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Pipeline started: all stages open, workers running.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_streamline::observability::messages::pipeline::PipelineStarted;
///
/// let msg = PipelineStarted {
///     pipeline: "detector",
///     stage_count: 4,
///     worker_count: 6,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct PipelineStarted<'a> {
    pub pipeline: &'a str,
    pub stage_count: usize,
    pub worker_count: usize,
}

impl Display for PipelineStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' started: {} stages, {} workers",
            self.pipeline, self.stage_count, self.worker_count
        )
    }
}

impl StructuredLog for PipelineStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            stage_count = self.stage_count,
            worker_count = self.worker_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_started",
            span_name = name,
            pipeline = self.pipeline,
            stage_count = self.stage_count,
            worker_count = self.worker_count,
        )
    }
}

/// Pipeline start rolled back after a failure.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct PipelineStartRolledBack<'a> {
    pub pipeline: &'a str,
    pub closed_stages: usize,
}

impl Display for PipelineStartRolledBack<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' failed to start; closed {} already opened stages",
            self.pipeline, self.closed_stages
        )
    }
}

impl StructuredLog for PipelineStartRolledBack<'_> {
    fn log(&self) {
        tracing::warn!(
            pipeline = self.pipeline,
            closed_stages = self.closed_stages,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "pipeline_start_rolled_back",
            span_name = name,
            pipeline = self.pipeline,
            closed_stages = self.closed_stages,
        )
    }
}

/// Pipeline stopped.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PipelineStopped<'a> {
    pub pipeline: &'a str,
    pub discarded_frames: usize,
}

impl Display for PipelineStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' stopped, {} queued frames discarded",
            self.pipeline, self.discarded_frames
        )
    }
}

impl StructuredLog for PipelineStopped<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            discarded_frames = self.discarded_frames,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_stopped",
            span_name = name,
            pipeline = self.pipeline,
            discarded_frames = self.discarded_frames,
        )
    }
}

/// Worker thread spawned for one conveyor slot.
///
/// # Log Level
/// `trace!` - Very detailed diagnostic information
pub struct WorkerStarted<'a> {
    pub stage_name: &'a str,
    pub slot: usize,
}

impl Display for WorkerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Worker {} of stage '{}' started", self.slot, self.stage_name)
    }
}

impl StructuredLog for WorkerStarted<'_> {
    fn log(&self) {
        tracing::trace!(stage_name = self.stage_name, slot = self.slot, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "worker",
            span_name = name,
            stage_name = self.stage_name,
            slot = self.slot,
        )
    }
}

/// Worker thread left its loop.
///
/// # Log Level
/// `trace!` - Very detailed diagnostic information
pub struct WorkerExited<'a> {
    pub stage_name: &'a str,
    pub slot: usize,
    pub processed: u64,
}

impl Display for WorkerExited<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker {} of stage '{}' exited after {} frames",
            self.slot, self.stage_name, self.processed
        )
    }
}

impl StructuredLog for WorkerExited<'_> {
    fn log(&self) {
        tracing::trace!(
            stage_name = self.stage_name,
            slot = self.slot,
            processed = self.processed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "worker_exited",
            span_name = name,
            stage_name = self.stage_name,
            slot = self.slot,
        )
    }
}

/// A worker thread panicked outside of stage code.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct WorkerPanicked<'a> {
    pub stage_name: &'a str,
}

impl Display for WorkerPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "A worker of stage '{}' panicked", self.stage_name)
    }
}

impl StructuredLog for WorkerPanicked<'_> {
    fn log(&self) {
        tracing::error!(stage_name = self.stage_name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("worker_panicked", span_name = name, stage_name = self.stage_name)
    }
}

/// A stream's EOS has passed every stage of the pipeline.
///
/// # Log Level
/// `info!` - Important operational event
pub struct StreamCompleted<'a> {
    pub pipeline: &'a str,
    pub stream_id: &'a str,
}

impl Display for StreamCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream '{}' finished every stage of pipeline '{}'",
            self.stream_id, self.pipeline
        )
    }
}

impl StructuredLog for StreamCompleted<'_> {
    fn log(&self) {
        tracing::info!(pipeline = self.pipeline, stream_id = self.stream_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stream_completed",
            span_name = name,
            pipeline = self.pipeline,
            stream_id = self.stream_id,
        )
    }
}

/// `provide_data` refused a frame.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct ProvideDataRejected<'a> {
    pub pipeline: &'a str,
    pub stage_name: &'a str,
    pub reason: &'a str,
}

impl Display for ProvideDataRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' refused data for stage '{}': {}",
            self.pipeline, self.stage_name, self.reason
        )
    }
}

impl StructuredLog for ProvideDataRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            pipeline = self.pipeline,
            stage_name = self.stage_name,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "provide_data_rejected",
            span_name = name,
            pipeline = self.pipeline,
            stage_name = self.stage_name,
        )
    }
}

/// An event was posted to a bus that is not running.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct EventPostRejected<'a> {
    pub event_type: EventType,
    pub stage_name: &'a str,
}

impl Display for EventPostRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Event bus is not running; dropped {} event from stage '{}'",
            self.event_type, self.stage_name
        )
    }
}

impl StructuredLog for EventPostRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            event_type = %self.event_type,
            stage_name = self.stage_name,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "event_post_rejected",
            span_name = name,
            event_type = %self.event_type,
            stage_name = self.stage_name,
        )
    }
}

/// Event bus stopped.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct EventBusStopped {
    pub dropped_events: usize,
}

impl Display for EventBusStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Event bus stopped, {} undelivered events dropped", self.dropped_events)
    }
}

impl StructuredLog for EventBusStopped {
    fn log(&self) {
        tracing::debug!(dropped_events = self.dropped_events, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "event_bus_stopped",
            span_name = name,
            dropped_events = self.dropped_events,
        )
    }
}

/// An event reached the default watcher.
///
/// Errors log at `error!`, warnings and stream errors at `warn!`, the rest at
/// `info!`.
pub struct BusEventObserved<'a> {
    pub event: &'a Event,
}

impl Display for BusEventObserved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let event = self.event;
        write!(f, "[{}] stage '{}'", event.event_type, event.stage_name)?;
        if !event.stream_id.is_empty() {
            write!(f, " stream '{}'", event.stream_id)?;
        }
        if !event.message.is_empty() {
            write!(f, ": {}", event.message)?;
        }
        Ok(())
    }
}

impl StructuredLog for BusEventObserved<'_> {
    fn log(&self) {
        let event = self.event;
        match event.event_type {
            EventType::Error => tracing::error!(
                event_type = %event.event_type,
                stage_name = %event.stage_name,
                stream_id = %event.stream_id,
                "{}", self
            ),
            EventType::Warning | EventType::StreamError => tracing::warn!(
                event_type = %event.event_type,
                stage_name = %event.stage_name,
                stream_id = %event.stream_id,
                "{}", self
            ),
            EventType::Eos | EventType::Stop => tracing::info!(
                event_type = %event.event_type,
                stage_name = %event.stage_name,
                stream_id = %event.stream_id,
                "{}", self
            ),
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "bus_event",
            span_name = name,
            event_type = %self.event.event_type,
            stage_name = %self.event.stage_name,
            stream_id = %self.event.stream_id,
        )
    }
}
