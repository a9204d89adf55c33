// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in stage implementations.
//!
//! Real pipelines register their own stages with a
//! [`crate::config::StageRegistry`]. The stages in [`stub`] are registered by
//! [`crate::config::StageRegistry::with_builtin_stages`] and cover wiring,
//! testing and failure drills:
//!
//! - **PassThroughStage** (`pass_through`): forwards frames, optional `delay_ms`
//! - **CollectorStage** (`collector`): records frames and EOS notifications
//! - **FailingStage** (`failing`): fails on open, on process or panics
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use the_streamline::backends::stub::CollectorStage;
//! use the_streamline::config::StageRegistry;
//! use the_streamline::traits::Stage;
//!
//! let sink = Arc::new(CollectorStage::new());
//! let mut registry = StageRegistry::with_builtin_stages();
//! let shared = Arc::clone(&sink);
//! registry.register("sink", move || Arc::clone(&shared) as Arc<dyn Stage>);
//! assert!(registry.contains("sink"));
//! ```

pub mod stub;
