// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stage lifecycle and frame processing.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Stage opened successfully.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct StageOpened<'a> {
    pub stage_name: &'a str,
    pub class_name: &'a str,
    pub stage_id: usize,
}

impl Display for StageOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Opened stage '{}' ({}) with id {}",
            self.stage_name, self.class_name, self.stage_id
        )
    }
}

impl StructuredLog for StageOpened<'_> {
    fn log(&self) {
        tracing::debug!(
            stage_name = self.stage_name,
            class_name = self.class_name,
            stage_id = self.stage_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stage_opened",
            span_name = name,
            stage_name = self.stage_name,
            class_name = self.class_name,
            stage_id = self.stage_id,
        )
    }
}

/// Stage failed to open; the pipeline start is rolled back.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_streamline::observability::messages::stage::StageOpenFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "model file missing");
/// let msg = StageOpenFailed {
///     stage_name: "detector",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct StageOpenFailed<'a> {
    pub stage_name: &'a str,
    pub error: &'a (dyn std::error::Error + 'static),
}

impl Display for StageOpenFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stage '{}' failed to open: {}", self.stage_name, self.error)
    }
}

impl StructuredLog for StageOpenFailed<'_> {
    fn log(&self) {
        tracing::error!(
            stage_name = self.stage_name,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "stage_open_failed",
            span_name = name,
            stage_name = self.stage_name,
            error = %self.error,
        )
    }
}

/// Stage closed.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct StageClosed<'a> {
    pub stage_name: &'a str,
}

impl Display for StageClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Closed stage '{}'", self.stage_name)
    }
}

impl StructuredLog for StageClosed<'_> {
    fn log(&self) {
        tracing::debug!(stage_name = self.stage_name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("stage_closed", span_name = name, stage_name = self.stage_name)
    }
}

/// Stage `process` returned an error; the frame is dropped.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_streamline::observability::messages::stage::StageProcessFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt frame");
/// let msg = StageProcessFailed {
///     stage_name: "decoder",
///     stream_id: "cam-0",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct StageProcessFailed<'a> {
    pub stage_name: &'a str,
    pub stream_id: &'a str,
    pub error: &'a (dyn std::error::Error + 'static),
}

impl Display for StageProcessFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' failed to process frame of stream '{}': {}",
            self.stage_name, self.stream_id, self.error
        )
    }
}

impl StructuredLog for StageProcessFailed<'_> {
    fn log(&self) {
        tracing::error!(
            stage_name = self.stage_name,
            stream_id = self.stream_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "stage_process_failed",
            span_name = name,
            stage_name = self.stage_name,
            stream_id = self.stream_id,
            error = %self.error,
        )
    }
}

/// Stage `process` panicked; the frame is dropped and the worker carries on.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct StageProcessPanicked<'a> {
    pub stage_name: &'a str,
    pub stream_id: &'a str,
    pub panic_message: &'a str,
}

impl Display for StageProcessPanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' panicked while processing stream '{}': {}",
            self.stage_name, self.stream_id, self.panic_message
        )
    }
}

impl StructuredLog for StageProcessPanicked<'_> {
    fn log(&self) {
        tracing::error!(
            stage_name = self.stage_name,
            stream_id = self.stream_id,
            panic_message = self.panic_message,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "stage_process_panicked",
            span_name = name,
            stage_name = self.stage_name,
            stream_id = self.stream_id,
        )
    }
}

/// A frame left the graph without reaching every stage.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct FrameDropped<'a> {
    pub stage_name: &'a str,
    pub stream_id: &'a str,
    pub reason: &'a str,
}

impl Display for FrameDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' dropped frame of stream '{}': {}",
            self.stage_name, self.stream_id, self.reason
        )
    }
}

impl StructuredLog for FrameDropped<'_> {
    fn log(&self) {
        tracing::debug!(
            stage_name = self.stage_name,
            stream_id = self.stream_id,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "frame_dropped",
            span_name = name,
            stage_name = self.stage_name,
            stream_id = self.stream_id,
            reason = self.reason,
        )
    }
}
