// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline configuration validation.
//!
//! This module contains message types for logging events related to:
//! * Link graph validation (cycles, dangling `next` entries, unreachable stages)
//! * Duplicate stage name detection
//! * Overall validation outcome

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Cyclic link detected between stages.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_streamline::observability::messages::validation::CyclicLinkDetected;
///
/// let cycle = vec!["decode", "detect", "track", "decode"];
/// let msg = CyclicLinkDetected { cycle: &cycle };
///
/// tracing::error!("{}", msg);
/// ```
pub struct CyclicLinkDetected<'a> {
    pub cycle: &'a [&'a str],
}

impl Display for CyclicLinkDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cyclic link detected: {}", self.cycle.join(" -> "))
    }
}

impl StructuredLog for CyclicLinkDetected<'_> {
    fn log(&self) {
        tracing::error!(
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            cycle = self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
        )
    }
}

/// A stage lists a `next` stage that does not exist.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_streamline::observability::messages::validation::UnresolvedNextStage;
///
/// let msg = UnresolvedNextStage {
///     stage_name: "decode",
///     missing_next: "detector",
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct UnresolvedNextStage<'a> {
    pub stage_name: &'a str,
    pub missing_next: &'a str,
}

impl Display for UnresolvedNextStage<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' links to missing stage '{}'",
            self.stage_name, self.missing_next
        )
    }
}

impl StructuredLog for UnresolvedNextStage<'_> {
    fn log(&self) {
        tracing::error!(
            stage_name = self.stage_name,
            missing_next = self.missing_next,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            stage_name = self.stage_name,
            missing_next = self.missing_next,
        )
    }
}

/// Two stages share one name.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct DuplicateStageName<'a> {
    pub stage_name: &'a str,
}

impl Display for DuplicateStageName<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Duplicate stage name: '{}'", self.stage_name)
    }
}

impl StructuredLog for DuplicateStageName<'_> {
    fn log(&self) {
        tracing::error!(stage_name = self.stage_name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            stage_name = self.stage_name,
        )
    }
}

/// Pipeline configuration validation started.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct ValidationStarted<'a> {
    pub pipeline: &'a str,
    pub stage_count: usize,
}

impl Display for ValidationStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Validating pipeline '{}' with {} stages",
            self.pipeline, self.stage_count
        )
    }
}

impl StructuredLog for ValidationStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            pipeline = self.pipeline,
            stage_count = self.stage_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::DEBUG,
            "span_name",
            name = name,
            pipeline = self.pipeline,
            stage_count = self.stage_count,
        )
    }
}

/// Pipeline configuration validation completed successfully.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct ValidationCompleted<'a> {
    pub pipeline: &'a str,
    pub stage_count: usize,
    pub root_count: usize,
}

impl Display for ValidationCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' is valid: {} stages, {} roots",
            self.pipeline, self.stage_count, self.root_count
        )
    }
}

impl StructuredLog for ValidationCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            pipeline = self.pipeline,
            stage_count = self.stage_count,
            root_count = self.root_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::DEBUG,
            "span_name",
            name = name,
            pipeline = self.pipeline,
            stage_count = self.stage_count,
            root_count = self.root_count,
        )
    }
}

/// Pipeline configuration validation failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_streamline::observability::messages::validation::ValidationFailed;
///
/// let msg = ValidationFailed {
///     pipeline: "detector",
///     error_count: 3,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ValidationFailed<'a> {
    pub pipeline: &'a str,
    pub error_count: usize,
}

impl Display for ValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline '{}' failed validation with {} errors",
            self.pipeline, self.error_count
        )
    }
}

impl StructuredLog for ValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(
            pipeline = self.pipeline,
            error_count = self.error_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "span_name",
            name = name,
            pipeline = self.pipeline,
            error_count = self.error_count,
        )
    }
}
