// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod registry;
mod validation;

pub mod consts;

pub use loader::{load_and_validate_config, load_config, PipelineConfig, StageConfig};
pub use registry::{StageFactory, StageRegistry};
pub use validation::validate_stage_configs;
