// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // built-in stage implementations
pub mod config;     // config loading, validation + stage registry
pub mod engine;     // pipeline, conveyors, event bus
pub mod errors;     // error handling
pub mod frame;      // frame units + stream admission
pub mod observability;
pub mod traits;     // stage + perf recorder contracts
