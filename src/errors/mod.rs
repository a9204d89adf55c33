// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod frame;
mod loader;
mod pipeline;

pub use config::ValidationError;
pub use frame::FrameError;
pub use loader::ConfigError;
pub use pipeline::PipelineError;
