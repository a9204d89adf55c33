// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail};

use crate::engine::StageContext;
use crate::frame::FramePtr;
use crate::traits::{ParamSet, Stage};

/// A stage that forwards every frame untouched.
///
/// The optional `delay_ms` parameter makes `process` sleep before returning,
/// which is handy for exercising back-pressure.
#[derive(Debug, Default)]
pub struct PassThroughStage {
    delay_ms: AtomicU64,
}

impl PassThroughStage {
    pub const CLASS_NAME: &'static str = "pass_through";

    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_delay(params: &ParamSet) -> anyhow::Result<u64> {
    match params.get("delay_ms") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("delay_ms must be a whole number of milliseconds, got '{}'", value)),
        None => Ok(0),
    }
}

impl Stage for PassThroughStage {
    fn open(&self, params: &ParamSet, _ctx: &StageContext) -> anyhow::Result<()> {
        self.delay_ms.store(parse_delay(params)?, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) {}

    fn process(&self, _frame: &FramePtr, _ctx: &StageContext) -> anyhow::Result<()> {
        let delay = self.delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        Ok(())
    }

    fn check_param_set(&self, params: &ParamSet) -> bool {
        parse_delay(params).is_ok()
    }
}

/// What a [`CollectorStage`] saw of one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFrame {
    pub stream_id: String,
    pub timestamp: i64,
    pub worker: Option<String>,
}

/// One entry of a [`CollectorStage`]'s arrival log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorEvent {
    Frame { stream_id: String, timestamp: i64 },
    Eos { stream_id: String },
}

/// A stage that records every frame and EOS it sees.
#[derive(Debug, Default)]
pub struct CollectorStage {
    frames: Mutex<Vec<CollectedFrame>>,
    events: Mutex<Vec<CollectorEvent>>,
    eos_streams: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl CollectorStage {
    pub const CLASS_NAME: &'static str = "collector";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<CollectedFrame> {
        self.frames.lock().clone()
    }

    /// Timestamps of the frames of `stream_id`, in arrival order
    pub fn timestamps_for(&self, stream_id: &str) -> Vec<i64> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f.stream_id == stream_id)
            .map(|f| f.timestamp)
            .collect()
    }

    /// Frames and EOS notifications of `stream_id`, interleaved in arrival order
    pub fn events_for(&self, stream_id: &str) -> Vec<CollectorEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| match event {
                CollectorEvent::Frame { stream_id: id, .. } | CollectorEvent::Eos { stream_id: id } => id == stream_id,
            })
            .cloned()
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Streams whose EOS reached this stage, in arrival order
    pub fn eos_streams(&self) -> Vec<String> {
        self.eos_streams.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Stage for CollectorStage {
    fn open(&self, _params: &ParamSet, _ctx: &StageContext) -> anyhow::Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn process(&self, frame: &FramePtr, _ctx: &StageContext) -> anyhow::Result<()> {
        self.events.lock().push(CollectorEvent::Frame {
            stream_id: frame.stream_id().to_string(),
            timestamp: frame.timestamp(),
        });
        self.frames.lock().push(CollectedFrame {
            stream_id: frame.stream_id().to_string(),
            timestamp: frame.timestamp(),
            worker: thread::current().name().map(str::to_string),
        });
        Ok(())
    }

    fn on_eos(&self, stream_id: &str) {
        self.events.lock().push(CollectorEvent::Eos {
            stream_id: stream_id.to_string(),
        });
        self.eos_streams.lock().push(stream_id.to_string());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FailOn {
    Open,
    #[default]
    Process,
    Panic,
}

#[derive(Debug, Clone, Copy, Default)]
struct FailingSettings {
    fail_on: FailOn,
    /// Only frames with this timestamp fail; `None` fails every frame
    timestamp: Option<i64>,
}

fn parse_failing_settings(params: &ParamSet) -> anyhow::Result<FailingSettings> {
    let fail_on = match params.get("fail_on").map(String::as_str) {
        None | Some("process") => FailOn::Process,
        Some("open") => FailOn::Open,
        Some("panic") => FailOn::Panic,
        Some(other) => bail!("fail_on must be one of open, process, panic; got '{}'", other),
    };
    let timestamp = match params.get("fail_timestamp") {
        Some(value) => Some(
            value
                .parse()
                .map_err(|_| anyhow!("fail_timestamp must be an integer, got '{}'", value))?,
        ),
        None => None,
    };
    Ok(FailingSettings { fail_on, timestamp })
}

/// A stage that fails on purpose.
///
/// Parameters:
/// * `fail_on` - `open`, `process` (default) or `panic`
/// * `fail_timestamp` - restrict process failures to frames with this timestamp
#[derive(Debug, Default)]
pub struct FailingStage {
    settings: Mutex<FailingSettings>,
}

impl FailingStage {
    pub const CLASS_NAME: &'static str = "failing";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for FailingStage {
    fn open(&self, params: &ParamSet, ctx: &StageContext) -> anyhow::Result<()> {
        let settings = parse_failing_settings(params)?;
        if settings.fail_on == FailOn::Open {
            bail!("stage '{}' refused to open", ctx.name());
        }
        *self.settings.lock() = settings;
        Ok(())
    }

    fn close(&self) {}

    fn process(&self, frame: &FramePtr, ctx: &StageContext) -> anyhow::Result<()> {
        let settings = *self.settings.lock();
        if settings.timestamp.is_some_and(|ts| ts != frame.timestamp()) {
            return Ok(());
        }
        match settings.fail_on {
            FailOn::Panic => panic!("stage '{}' panicked on purpose", ctx.name()),
            _ => bail!(
                "stage '{}' failed frame {} of stream '{}'",
                ctx.name(),
                frame.timestamp(),
                frame.stream_id()
            ),
        }
    }

    fn check_param_set(&self, params: &ParamSet) -> bool {
        parse_failing_settings(params).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventBus;
    use crate::frame::StreamAdmission;
    use std::sync::{Arc, Weak};

    fn context(name: &str) -> StageContext {
        StageContext::new(
            name,
            0,
            0,
            Arc::new(StreamAdmission::new()),
            Arc::new(EventBus::new()),
            Weak::new(),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> ParamSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_pass_through_checks_delay() {
        let stage = PassThroughStage::new();
        assert!(stage.check_param_set(&params(&[])));
        assert!(stage.check_param_set(&params(&[("delay_ms", "5")])));
        assert!(!stage.check_param_set(&params(&[("delay_ms", "-1")])));

        let ctx = context("pt");
        stage.open(&params(&[("delay_ms", "1")]), &ctx).unwrap();
        let frame = ctx.create_frame("s0", false, None).unwrap();
        assert!(stage.process(&frame, &ctx).is_ok());
    }

    #[test]
    fn test_collector_records_frames_and_eos() {
        let stage = CollectorStage::new();
        let ctx = context("sink");
        stage.open(&ParamSet::new(), &ctx).unwrap();

        for ts in [3, 1, 2] {
            let frame = ctx.create_frame("s0", false, None).unwrap();
            frame.set_timestamp(ts);
            stage.process(&frame, &ctx).unwrap();
        }
        stage.on_eos("s0");
        stage.close();

        assert_eq!(stage.timestamps_for("s0"), vec![3, 1, 2]);
        assert!(stage.timestamps_for("s1").is_empty());
        assert_eq!(stage.eos_streams(), vec!["s0".to_string()]);
        assert_eq!((stage.open_count(), stage.close_count()), (1, 1));

        let events = stage.events_for("s0");
        assert_eq!(events.len(), 4);
        assert_eq!(
            events.last(),
            Some(&CollectorEvent::Eos {
                stream_id: "s0".to_string()
            })
        );
        assert!(stage.events_for("s1").is_empty());
    }

    #[test]
    fn test_failing_stage_modes() {
        struct TestCase {
            name: &'static str,
            params: Vec<(&'static str, &'static str)>,
            valid: bool,
            open_ok: bool,
            fails_ts_0: bool,
            fails_ts_7: bool,
        }

        let test_cases = vec![
            TestCase {
                name: "default fails every frame",
                params: vec![],
                valid: true,
                open_ok: true,
                fails_ts_0: true,
                fails_ts_7: true,
            },
            TestCase {
                name: "targeted timestamp",
                params: vec![("fail_timestamp", "7")],
                valid: true,
                open_ok: true,
                fails_ts_0: false,
                fails_ts_7: true,
            },
            TestCase {
                name: "open failure",
                params: vec![("fail_on", "open")],
                valid: true,
                open_ok: false,
                fails_ts_0: false,
                fails_ts_7: false,
            },
            TestCase {
                name: "unknown mode",
                params: vec![("fail_on", "sometimes")],
                valid: false,
                open_ok: false,
                fails_ts_0: false,
                fails_ts_7: false,
            },
        ];

        for case in test_cases {
            let stage = FailingStage::new();
            let ctx = context("broken");
            let params = params(&case.params);
            assert_eq!(stage.check_param_set(&params), case.valid, "{}", case.name);

            let opened = stage.open(&params, &ctx).is_ok();
            assert_eq!(opened, case.open_ok, "{}", case.name);
            if !opened {
                continue;
            }

            for (ts, expect_failure) in [(0, case.fails_ts_0), (7, case.fails_ts_7)] {
                let frame = ctx.create_frame("s0", false, None).unwrap();
                frame.set_timestamp(ts);
                assert_eq!(
                    stage.process(&frame, &ctx).is_err(),
                    expect_failure,
                    "{} at ts {}",
                    case.name,
                    ts
                );
            }
        }
    }

    #[test]
    #[should_panic(expected = "panicked on purpose")]
    fn test_failing_stage_panics() {
        let stage = FailingStage::new();
        let ctx = context("broken");
        stage.open(&params(&[("fail_on", "panic")]), &ctx).unwrap();
        let frame = ctx.create_frame("s0", false, None).unwrap();
        let _ = stage.process(&frame, &ctx);
    }
}
