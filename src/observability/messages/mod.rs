// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for consistent, human-readable
//! output and [`StructuredLog`] to emit itself with structured fields.
//!
//! # Organization
//!
//! * `pipeline` - pipeline lifecycle, workers and the event bus
//! * `stage` - stage lifecycle and processing events
//! * `validation` - configuration validation errors
//!
//! # Usage Pattern
//!
//! ```rust
//! use the_streamline::observability::messages::pipeline::PipelineStarted;
//! use the_streamline::observability::messages::StructuredLog;
//!
//! let msg = PipelineStarted {
//!     pipeline: "detector",
//!     stage_count: 4,
//!     worker_count: 7,
//! };
//!
//! tracing::info!("{}", msg);
//! msg.log();
//! ```

use std::fmt::Display;
use tracing::Span;

pub mod pipeline;
pub mod stage;
pub mod validation;

/// A message that knows its own log level and structured fields
pub trait StructuredLog: Display {
    /// Emit the message through `tracing`
    fn log(&self);

    /// Build a span carrying the message's fields
    fn span(&self, name: &str) -> Span;
}
