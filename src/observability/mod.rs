// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and performance recording.
//!
//! Diagnostic output goes through `tracing`. Message types live under
//! [`messages`], one struct per event, each implementing `Display` for the
//! human-readable text and [`messages::StructuredLog`] to emit it with
//! structured fields at the right level.
//!
//! # Architecture
//!
//! * `messages::pipeline` - pipeline lifecycle, worker and event bus events
//! * `messages::stage` - stage open/close/process events
//! * `messages::validation` - configuration validation errors
//! * `perf` - per-frame enter/exit records handed to a [`crate::traits::PerfRecorder`]
//!
//! # Usage
//!
//! ```rust
//! use the_streamline::observability::messages::stage::StageProcessFailed;
//! use the_streamline::observability::messages::StructuredLog;
//!
//! let error = anyhow::anyhow!("decoder lost sync");
//! StageProcessFailed {
//!     stage_name: "decoder",
//!     stream_id: "cam-0",
//!     error: &*error,
//! }
//! .log();
//! ```

pub mod messages;
pub mod perf;

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// Uses `RUST_LOG` when set and falls back to `default_filter`. Returns
/// `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
