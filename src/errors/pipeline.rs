// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for pipeline construction, lifecycle and data injection.

use thiserror::Error;

use super::ValidationError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The stage configurations failed validation
    #[error("Pipeline '{pipeline}' failed validation: {}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation {
        pipeline: String,
        errors: Vec<ValidationError>,
    },

    /// Every stage identity is already leased
    #[error("No free stage identity left for stage '{stage}'")]
    IdentityExhausted { stage: String },

    /// The registry returned no instance for a class it claimed to know
    #[error("Failed to create stage '{stage}' of class '{class_name}'")]
    StageCreationFailed { stage: String, class_name: String },

    /// A stage's `open` hook failed; already-opened stages were closed again
    #[error("Stage '{stage}' failed to open: {source}")]
    StageOpenFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker {slot} of stage '{stage}': {source}")]
    WorkerSpawnFailed {
        stage: String,
        slot: usize,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread died outside of stage code; reported once shutdown completed
    #[error("A worker of stage '{stage}' panicked")]
    WorkerPanicked { stage: String },

    #[error("Stage '{stage}' is not part of pipeline '{pipeline}'")]
    UnknownStage { pipeline: String, stage: String },

    #[error("Stage '{stage}' is not a root stage; data can only be provided to root stages")]
    NotRootStage { stage: String },

    #[error("Pipeline '{pipeline}' is not running")]
    NotRunning { pipeline: String },
}
