// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors that can occur while validating a list of stage configurations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The configuration declares no stages at all
    #[error("Pipeline '{pipeline}' declares no stages")]
    EmptyPipeline { pipeline: String },

    /// More stages than the visited mask can track
    #[error("Pipeline declares {count} stages but at most {max} are supported")]
    TooManyStages { count: usize, max: usize },

    /// Two stages share a name
    #[error("Duplicate stage name: '{stage}'")]
    DuplicateStageName { stage: String },

    /// A stage name is the empty string
    #[error("Stage at position {index} has an empty name")]
    EmptyStageName { index: usize },

    /// No factory is registered for the class name
    #[error("Stage '{stage}' uses class '{class_name}' which is not registered")]
    UnknownClass { stage: String, class_name: String },

    /// Parallelism must be at least one worker
    #[error("Stage '{stage}' has parallelism {parallelism}; it must be at least 1")]
    InvalidParallelism { stage: String, parallelism: usize },

    /// Input queue must hold at least one frame
    #[error("Stage '{stage}' has max_input_queue_size {size}; it must be at least 1")]
    InvalidQueueSize { stage: String, size: usize },

    /// A `next` entry names a stage that does not exist
    #[error("Stage '{stage}' links to '{missing_next}' which does not exist")]
    UnresolvedNext { stage: String, missing_next: String },

    /// A circular link was detected in the stage graph
    #[error("Cyclic link detected: {}", .cycle.join(" -> "))]
    CyclicLink { cycle: Vec<String> },

    /// A stage cannot be reached from any root stage
    #[error("Stage '{stage}' is not reachable from any root stage")]
    UnreachableStage { stage: String },

    /// The stage implementation rejected its parameters
    #[error("Stage '{stage}' rejected its parameter set")]
    InvalidParameters { stage: String },
}
