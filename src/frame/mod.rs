// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod admission;
mod unit;

pub use admission::StreamAdmission;
pub use unit::{Collection, FrameFlag, FramePtr, FrameUnit};
