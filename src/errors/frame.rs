// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors returned when creating frame units.

use thiserror::Error;

/// Reasons a frame unit could not be created.
///
/// `FlowDepthReached` is flow control rather than a fault: the caller is
/// expected to back off and retry once downstream stages release frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame stream id must not be empty")]
    EmptyStreamId,

    #[error("Stream '{stream_id}' reached its flow depth of {flow_depth} in-flight frames")]
    FlowDepthReached { stream_id: String, flow_depth: usize },
}

impl FrameError {
    /// True when the refusal is backpressure and the caller may retry.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, FrameError::FlowDepthReached { .. })
    }
}
