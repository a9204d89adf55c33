use std::collections::HashMap;

use crate::engine::context::StageContext;
use crate::frame::FramePtr;

/// String parameters handed to a stage on `open`
pub type ParamSet = HashMap<String, String>;

/// A unit of work in a pipeline.
///
/// One instance serves every worker of its stage, so `process` may run on
/// several threads at once; frames of one stream always arrive on the same
/// worker.
///
/// A standard stage only transforms frames: the pipeline forwards each frame
/// after `process` returns `Ok`, and calls `on_eos` instead of `process` for
/// end-of-stream frames. A stage returning `true` from `self_transmit` sees
/// every frame, EOS included, and forwards frames itself through
/// [`StageContext::transmit`].
pub trait Stage: Send + Sync {
    /// Prepare for processing. An `Err` aborts the pipeline start.
    fn open(&self, params: &ParamSet, ctx: &StageContext) -> anyhow::Result<()>;

    fn close(&self);

    /// Handle one frame. An `Err` drops the frame; it is not retried.
    fn process(&self, frame: &FramePtr, ctx: &StageContext) -> anyhow::Result<()>;

    fn on_eos(&self, _stream_id: &str) {}

    /// Reject parameter sets this stage cannot work with
    fn check_param_set(&self, _params: &ParamSet) -> bool {
        true
    }

    fn self_transmit(&self) -> bool {
        false
    }
}
