pub mod perf;
pub mod stage;

pub use perf::PerfRecorder;
pub use stage::{ParamSet, Stage};
