// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage graph construction, lifecycle and the frame transmit path.
//!
//! A [`Pipeline`] owns a directed acyclic graph of stages. Stages without
//! parents are *roots*; frames enter the graph only through them, either via
//! [`Pipeline::provide_data`] or by a root stage transmitting frames it
//! created itself. Every non-root stage owns a [`Connector`] with one
//! conveyor per worker thread, and a static pool of OS threads (one per
//! stage and parallelism slot) moves frames through the graph.
//!
//! # Transmit path
//!
//! When a stage is done with a frame the pipeline:
//!
//! 1. applies the root's route mask (root stages only) and marks the stage as
//!    visited on the frame;
//! 2. posts an `Eos` event for end-of-stream frames;
//! 3. drops ordinary frames of removed streams;
//! 4. drops `INVALID` frames after posting a `Warning` event;
//! 5. pushes the frame to every downstream stage whose parents have all
//!    visited it, on the slot picked by hashing the stream id;
//! 6. calls the frame-done callback when the frame leaves a leaf stage.
//!
//! # Stream messages
//!
//! An optional [`StreamMsgObserver`] hears about streams as a whole: `Eos`
//! once per EOS frame, when it has visited every stage; `Error` and
//! `StreamError` whenever such an event is posted; `FrameError` when an
//! invalid frame is dropped.
//!
//! Step 5 is the fan-in merge: with several parents exactly one parent
//! thread observes the visited mask become complete and performs the push.
//!
//! # Route masks
//!
//! In a graph with several roots a frame only travels the stages reachable
//! from the root it entered through. Each root carries a route mask with the
//! bits of every stage it cannot reach; the mask is stamped on the frame so
//! that fan-in stages shared with other roots are not left waiting for
//! parents the frame will never visit.
//!
//! # Examples
//!
//! ```rust
//! use the_streamline::config::{PipelineConfig, StageConfig, StageRegistry};
//! use the_streamline::engine::Pipeline;
//! use the_streamline::frame::FrameUnit;
//!
//! let config = PipelineConfig {
//!     name: "demo".to_string(),
//!     flow_depth: 4,
//!     stages: vec![
//!         StageConfig::new("source", "pass_through").with_next(&["sink"]),
//!         StageConfig::new("sink", "pass_through").with_parallelism(2),
//!     ],
//! };
//!
//! let pipeline = Pipeline::build(&config, &StageRegistry::with_builtin_stages()).unwrap();
//! pipeline.start().unwrap();
//!
//! let frame = FrameUnit::create(pipeline.admission(), "cam-0", false, None).unwrap();
//! pipeline.provide_data("source", frame).unwrap();
//! let eos = FrameUnit::create(pipeline.admission(), "cam-0", true, None).unwrap();
//! pipeline.provide_data("source", eos).unwrap();
//!
//! assert!(pipeline.admission().reached_eos("cam-0", true));
//! pipeline.stop().unwrap();
//! ```

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::config::consts::WORKER_NAME_PREFIX_LEN;
use crate::config::{validate_stage_configs, PipelineConfig, StageConfig, StageRegistry};
use crate::engine::connector::Connector;
use crate::engine::context::StageContext;
use crate::engine::event_bus::{Event, EventBus, EventHandleFlag, EventType};
use crate::engine::identity::{StageId, StageIdLease, StageIdentityPool, StageMask};
use crate::errors::{PipelineError, ValidationError};
use crate::frame::{FrameFlag, FramePtr, StreamAdmission};
use crate::observability::messages::pipeline::{
    BusEventObserved, PipelineStartRolledBack, PipelineStarted, PipelineStopped,
    ProvideDataRejected, StreamCompleted, WorkerExited, WorkerPanicked, WorkerStarted,
};
use crate::observability::messages::stage::{
    FrameDropped, StageClosed, StageOpenFailed, StageOpened, StageProcessFailed,
    StageProcessPanicked,
};
use crate::observability::messages::StructuredLog;
use crate::observability::perf::{PerfEvent, PerfPhase};
use crate::traits::{PerfRecorder, Stage};

/// Called with every frame that leaves a leaf stage
pub type FrameDoneCallback = Arc<dyn Fn(&FramePtr) + Send + Sync>;

/// Kind of a [`StreamMsg`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMsgType {
    /// The stream's EOS has passed every stage
    Eos,
    /// A stage failed; the frame was dropped
    Error,
    /// A stage reported the stream as broken
    StreamError,
    /// An invalid frame was dropped
    FrameError,
}

/// Stream-level notification for the pipeline's owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMsg {
    pub msg_type: StreamMsgType,
    pub stream_id: String,
    pub stage_name: String,
    pub message: String,
}

impl StreamMsg {
    fn new(msg_type: StreamMsgType, stream_id: &str, stage_name: &str, message: impl Into<String>) -> Self {
        Self {
            msg_type,
            stream_id: stream_id.to_string(),
            stage_name: stage_name.to_string(),
            message: message.into(),
        }
    }
}

/// Called on the thread that produced the message; must not block for long
pub type StreamMsgObserver = Arc<dyn Fn(&StreamMsg) + Send + Sync>;

/// Snapshot of a stage's input connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub stopped: bool,
    /// Queued frames per conveyor slot
    pub cache_sizes: Vec<usize>,
}

pub(crate) struct StageNode {
    name: String,
    config: StageConfig,
    stage: Arc<dyn Stage>,
    lease: StageIdLease,
    children: Vec<usize>,
    parent_mask: StageMask,
    route_mask: StageMask,
    connector: Option<Connector<FramePtr>>,
    context: StageContext,
}

impl StageNode {
    fn id(&self) -> StageId {
        self.lease.id()
    }

    fn is_root(&self) -> bool {
        self.connector.is_none()
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Shared state reached by worker threads and stage contexts
pub(crate) struct PipelineCore {
    name: String,
    nodes: Vec<StageNode>,
    index: HashMap<String, usize>,
    event_bus: Arc<EventBus>,
    admission: Arc<StreamAdmission>,
    running: AtomicBool,
    /// Ids of every stage; an EOS frame covering it has finished the graph
    all_stages: StageMask,
    perf_recorder: RwLock<Option<Arc<dyn PerfRecorder>>>,
    frame_done: RwLock<Option<FrameDoneCallback>>,
    stream_observer: RwLock<Option<StreamMsgObserver>>,
}

impl PipelineCore {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Post `event` on the bus, telling the stream observer about failures
    pub(crate) fn post_event(&self, event: Event) -> bool {
        let msg_type = match event.event_type {
            EventType::Error => Some(StreamMsgType::Error),
            EventType::StreamError => Some(StreamMsgType::StreamError),
            _ => None,
        };
        let msg = msg_type.map(|t| StreamMsg::new(t, &event.stream_id, &event.stage_name, event.message.as_str()));

        if !self.event_bus.post(event) {
            return false;
        }
        if let Some(msg) = msg {
            self.notify_stream_msg(&msg);
        }
        true
    }

    fn notify_stream_msg(&self, msg: &StreamMsg) {
        let observer = self.stream_observer.read().clone();
        if let Some(observer) = observer {
            observer(msg);
        }
    }

    fn record_perf(&self, frame: &FramePtr, stage_name: &str, phase: PerfPhase) {
        if frame.is_eos() {
            return;
        }
        let recorder = self.perf_recorder.read().clone();
        if let Some(recorder) = recorder {
            recorder.record(PerfEvent::now(frame.stream_id(), stage_name, phase));
        }
    }

    /// Forward `frame` as output of the stage at `index`
    pub(crate) fn transmit(&self, index: usize, frame: FramePtr) {
        let node = &self.nodes[index];

        if frame.is_eos() && frame.payload().is_some() && self.admission.is_removed(frame.stream_id()) {
            self.admission.set_removed(frame.stream_id(), false);
        }

        if node.is_root() {
            frame.set_visited(node.route_mask);
        }
        let (before, after) = frame.mark_visited(node.id());

        if frame.is_eos() {
            self.post_event(Event::new(EventType::Eos, &node.name, "").with_stream(frame.stream_id()));
            if after.covers(self.all_stages) && !before.covers(self.all_stages) {
                StreamCompleted {
                    pipeline: &self.name,
                    stream_id: frame.stream_id(),
                }
                .log();
                self.notify_stream_msg(&StreamMsg::new(
                    StreamMsgType::Eos,
                    frame.stream_id(),
                    &node.name,
                    "",
                ));
            }
        } else {
            if self.admission.is_removed(frame.stream_id()) {
                FrameDropped {
                    stage_name: &node.name,
                    stream_id: frame.stream_id(),
                    reason: "stream removed",
                }
                .log();
                return;
            }
            if !node.is_root() {
                self.record_perf(&frame, &node.name, PerfPhase::Exit);
            }
        }

        if frame.is_invalid() {
            self.post_event(
                Event::new(EventType::Warning, &node.name, "invalid frame dropped")
                    .with_stream(frame.stream_id()),
            );
            self.notify_stream_msg(&StreamMsg::new(
                StreamMsgType::FrameError,
                frame.stream_id(),
                &node.name,
                "invalid frame dropped",
            ));
            FrameDropped {
                stage_name: &node.name,
                stream_id: frame.stream_id(),
                reason: "frame flagged invalid",
            }
            .log();
            return;
        }

        for &child_index in &node.children {
            let child = &self.nodes[child_index];
            // Only the parent completing the child's parent set pushes
            if !after.covers(child.parent_mask) || before.covers(child.parent_mask) {
                continue;
            }
            if let Some(connector) = child.connector.as_ref() {
                let slot = connector.slot_for(frame.stream_id());
                connector.push(slot, Arc::clone(&frame));
            }
        }

        if node.is_leaf() {
            let callback = self.frame_done.read().clone();
            if let Some(callback) = callback {
                callback(&frame);
            }
        }
    }

    /// Run the stage at `index` on `frame`, then forward it for standard stages
    fn process_frame(&self, index: usize, frame: FramePtr) {
        let node = &self.nodes[index];

        let mut removed = self.admission.is_removed(frame.stream_id());
        if !removed {
            if let Some(payload) = frame.payload() {
                if self.admission.is_removed(payload.stream_id()) {
                    self.admission.set_removed(frame.stream_id(), true);
                    removed = true;
                }
            }
        }

        if node.stage.self_transmit() {
            if removed {
                frame.set_flag(FrameFlag::Removed);
            }
            self.record_perf(&frame, &node.name, PerfPhase::Enter);
            self.invoke_process(node, &frame);
            return;
        }

        if frame.is_eos() {
            node.stage.on_eos(frame.stream_id());
            self.transmit(index, frame);
            return;
        }

        if !removed {
            self.record_perf(&frame, &node.name, PerfPhase::Enter);
            if !self.invoke_process(node, &frame) {
                return;
            }
        }
        self.transmit(index, frame);
    }

    /// Call `Stage::process`, containing errors and panics. Returns `true` on success.
    fn invoke_process(&self, node: &StageNode, frame: &FramePtr) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| node.stage.process(frame, &node.context)));
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                StageProcessFailed {
                    stage_name: &node.name,
                    stream_id: frame.stream_id(),
                    error: &*error,
                }
                .log();
                self.post_event(
                    Event::new(EventType::Error, &node.name, format!("process failed: {}", error))
                        .with_stream(frame.stream_id()),
                );
                false
            }
            Err(panic_payload) => {
                let panic_message = panic_message(panic_payload.as_ref());
                StageProcessPanicked {
                    stage_name: &node.name,
                    stream_id: frame.stream_id(),
                    panic_message: &panic_message,
                }
                .log();
                self.post_event(
                    Event::new(EventType::Error, &node.name, format!("process panicked: {}", panic_message))
                        .with_stream(frame.stream_id()),
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_worker(core: Arc<PipelineCore>, index: usize, slot: usize) {
    let node = &core.nodes[index];
    let Some(connector) = node.connector.as_ref() else {
        return;
    };

    let span = WorkerStarted {
        stage_name: &node.name,
        slot,
    }
    .span("worker");
    let _entered = span.enter();
    WorkerStarted {
        stage_name: &node.name,
        slot,
    }
    .log();

    let mut processed = 0u64;
    while let Some(frame) = connector.pop(slot) {
        core.process_frame(index, frame);
        processed += 1;
    }

    WorkerExited {
        stage_name: &node.name,
        slot,
        processed,
    }
    .log();
}

fn worker_thread_name(stage_name: &str, slot: usize) -> String {
    let prefix: String = stage_name.chars().take(WORKER_NAME_PREFIX_LEN).collect();
    format!("sl-{}-{:02}", prefix, slot)
}

/// Stage ids of every stage reachable from `root`, the root included
fn reachable_from(root: usize, children: &[Vec<usize>]) -> HashSet<usize> {
    let mut reached = HashSet::new();
    let mut stack = vec![root];
    while let Some(index) = stack.pop() {
        if reached.insert(index) {
            stack.extend(children[index].iter().copied());
        }
    }
    reached
}

fn default_watcher(event: &Event) -> EventHandleFlag {
    BusEventObserved { event }.log();
    EventHandleFlag::Synced
}

/// A running (or runnable) stage graph.
pub struct Pipeline {
    core: Arc<PipelineCore>,
    workers: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Pipeline {
    /// Build a pipeline from a loaded configuration with fresh services
    pub fn build(config: &PipelineConfig, registry: &StageRegistry) -> Result<Self, PipelineError> {
        Self::build_with_services(
            config,
            registry,
            Arc::new(StreamAdmission::new()),
            StageIdentityPool::new(),
        )
    }

    /// Build a pipeline with unlimited flow depth
    pub fn new(name: &str, stages: &[StageConfig], registry: &StageRegistry) -> Result<Self, PipelineError> {
        let config = PipelineConfig {
            name: name.to_string(),
            flow_depth: 0,
            stages: stages.to_vec(),
        };
        Self::build(&config, registry)
    }

    /// Build a pipeline on shared services.
    ///
    /// Pipelines sharing `admission` share per-stream flow accounting and EOS
    /// markers; the config's flow depth is applied to it. Stage ids are leased
    /// from `identities` and returned when the pipeline is dropped.
    pub fn build_with_services(
        config: &PipelineConfig,
        registry: &StageRegistry,
        admission: Arc<StreamAdmission>,
        identities: Arc<StageIdentityPool>,
    ) -> Result<Self, PipelineError> {
        let name = config.name.as_str();
        let invalid = |errors: Vec<ValidationError>| PipelineError::Validation {
            pipeline: name.to_string(),
            errors,
        };

        validate_stage_configs(name, &config.stages, registry).map_err(invalid)?;

        let mut stages = Vec::with_capacity(config.stages.len());
        for stage_config in &config.stages {
            let stage = registry.create(&stage_config.class_name).ok_or_else(|| {
                PipelineError::StageCreationFailed {
                    stage: stage_config.name.clone(),
                    class_name: stage_config.class_name.clone(),
                }
            })?;
            stages.push(stage);
        }

        let rejected: Vec<ValidationError> = config
            .stages
            .iter()
            .zip(&stages)
            .filter(|(stage_config, stage)| !stage.check_param_set(&stage_config.parameters))
            .map(|(stage_config, _)| ValidationError::InvalidParameters {
                stage: stage_config.name.clone(),
            })
            .collect();
        if !rejected.is_empty() {
            return Err(invalid(rejected));
        }

        let mut leases = Vec::with_capacity(config.stages.len());
        for stage_config in &config.stages {
            let lease = identities.lease().ok_or_else(|| PipelineError::IdentityExhausted {
                stage: stage_config.name.clone(),
            })?;
            leases.push(lease);
        }

        let index: HashMap<String, usize> = config
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        let children: Vec<Vec<usize>> = config
            .stages
            .iter()
            .map(|s| s.next.iter().filter_map(|n| index.get(n).copied()).collect())
            .collect();

        let mut parent_masks = vec![StageMask::EMPTY; config.stages.len()];
        for (parent, kids) in children.iter().enumerate() {
            for &child in kids {
                parent_masks[child] = parent_masks[child].with(leases[parent].id());
            }
        }

        let route_masks: Vec<StageMask> = (0..config.stages.len())
            .map(|i| {
                if !parent_masks[i].is_empty() {
                    return StageMask::EMPTY;
                }
                let reached = reachable_from(i, &children);
                leases
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| !reached.contains(j))
                    .fold(StageMask::EMPTY, |mask, (_, lease)| mask.with(lease.id()))
            })
            .collect();

        let all_stages = leases
            .iter()
            .fold(StageMask::EMPTY, |mask, lease| mask.with(lease.id()));

        admission.set_flow_depth(config.flow_depth);
        let event_bus = Arc::new(EventBus::new());
        event_bus.add_watcher(default_watcher);

        let core = Arc::new_cyclic(|weak: &Weak<PipelineCore>| {
            let nodes = config
                .stages
                .iter()
                .zip(stages)
                .zip(leases)
                .enumerate()
                .map(|(i, ((stage_config, stage), lease))| {
                    let is_root = parent_masks[i].is_empty();
                    // Drop-oldest never evicts EOS frames, so every stage still finalizes the stream
                    let connector = (!is_root).then(|| {
                        Connector::with_eviction_filter(
                            stage_config.parallelism,
                            stage_config.max_input_queue_size,
                            stage_config.overflow_policy,
                            |frame: &FramePtr| !frame.is_eos(),
                        )
                    });
                    let context = StageContext::new(
                        &stage_config.name,
                        lease.id(),
                        i,
                        Arc::clone(&admission),
                        Arc::clone(&event_bus),
                        weak.clone(),
                    );
                    StageNode {
                        name: stage_config.name.clone(),
                        config: stage_config.clone(),
                        stage,
                        lease,
                        children: children[i].clone(),
                        parent_mask: parent_masks[i],
                        route_mask: route_masks[i],
                        connector,
                        context,
                    }
                })
                .collect();

            PipelineCore {
                name: name.to_string(),
                nodes,
                index,
                event_bus: Arc::clone(&event_bus),
                admission: Arc::clone(&admission),
                running: AtomicBool::new(false),
                all_stages,
                perf_recorder: RwLock::new(None),
                frame_done: RwLock::new(None),
                stream_observer: RwLock::new(None),
            }
        });

        Ok(Self {
            core,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Open every stage and spawn the workers.
    ///
    /// Stages open in declaration order. If one fails, the stages opened
    /// before it are closed in reverse order, no thread is spawned and the
    /// pipeline stays stopped. Calling `start` on a running pipeline is a
    /// no-op.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut workers = self.workers.lock();
        if self.core.is_running() {
            return Ok(());
        }

        let nodes = &self.core.nodes;
        for (i, node) in nodes.iter().enumerate() {
            if let Err(source) = node.stage.open(&node.config.parameters, &node.context) {
                StageOpenFailed {
                    stage_name: &node.name,
                    error: &*source,
                }
                .log();
                for opened in nodes[..i].iter().rev() {
                    opened.stage.close();
                    StageClosed {
                        stage_name: &opened.name,
                    }
                    .log();
                }
                PipelineStartRolledBack {
                    pipeline: &self.core.name,
                    closed_stages: i,
                }
                .log();
                return Err(PipelineError::StageOpenFailed {
                    stage: node.name.clone(),
                    source,
                });
            }
            StageOpened {
                stage_name: &node.name,
                class_name: &node.config.class_name,
                stage_id: node.id(),
            }
            .log();
        }

        self.core.running.store(true, Ordering::Release);
        self.core.event_bus.start();
        for connector in nodes.iter().filter_map(|n| n.connector.as_ref()) {
            connector.start();
        }

        for (index, node) in nodes.iter().enumerate() {
            let Some(connector) = node.connector.as_ref() else {
                continue;
            };
            for slot in 0..connector.conveyor_count() {
                let core = Arc::clone(&self.core);
                let spawned = thread::Builder::new()
                    .name(worker_thread_name(&node.name, slot))
                    .spawn(move || run_worker(core, index, slot));
                match spawned {
                    Ok(handle) => workers.push((node.name.clone(), handle)),
                    Err(source) => {
                        self.shutdown(&mut workers);
                        return Err(PipelineError::WorkerSpawnFailed {
                            stage: node.name.clone(),
                            slot,
                            source,
                        });
                    }
                }
            }
        }

        PipelineStarted {
            pipeline: &self.core.name,
            stage_count: nodes.len(),
            worker_count: workers.len(),
        }
        .log();
        Ok(())
    }

    /// Stop the workers and close every stage.
    ///
    /// Frames still queued are discarded. Stages close in reverse declaration
    /// order after every worker has exited. Calling `stop` on a stopped
    /// pipeline is a no-op.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let mut workers = self.workers.lock();
        if !self.core.is_running() {
            return Ok(());
        }
        match self.shutdown(&mut workers) {
            Some(stage) => Err(PipelineError::WorkerPanicked { stage }),
            None => Ok(()),
        }
    }

    /// Tear down a started pipeline; returns the stage of a panicked worker, if any
    fn shutdown(&self, workers: &mut Vec<(String, JoinHandle<()>)>) -> Option<String> {
        let nodes = &self.core.nodes;
        self.core.running.store(false, Ordering::Release);

        for connector in nodes.iter().filter_map(|n| n.connector.as_ref()) {
            connector.stop();
        }
        let discarded: usize = nodes
            .iter()
            .filter_map(|n| n.connector.as_ref())
            .map(|c| c.empty_data_queue().len())
            .sum();

        let current = thread::current().id();
        let mut panicked = None;
        for (stage_name, handle) in workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                WorkerPanicked {
                    stage_name: &stage_name,
                }
                .log();
                panicked.get_or_insert(stage_name);
            }
        }

        self.core.event_bus.stop();
        for node in nodes.iter().rev() {
            node.stage.close();
            StageClosed {
                stage_name: &node.name,
            }
            .log();
        }

        PipelineStopped {
            pipeline: &self.core.name,
            discarded_frames: discarded,
        }
        .log();
        panicked
    }

    /// Inject `frame` as output of root stage `stage_name`
    pub fn provide_data(&self, stage_name: &str, frame: FramePtr) -> Result<(), PipelineError> {
        let rejected = |reason: &str| {
            ProvideDataRejected {
                pipeline: &self.core.name,
                stage_name,
                reason,
            }
            .log();
        };

        if !self.core.is_running() {
            rejected("pipeline is not running");
            return Err(PipelineError::NotRunning {
                pipeline: self.core.name.clone(),
            });
        }
        let Some(&index) = self.core.index.get(stage_name) else {
            rejected("unknown stage");
            return Err(PipelineError::UnknownStage {
                pipeline: self.core.name.clone(),
                stage: stage_name.to_string(),
            });
        };
        if !self.core.nodes[index].is_root() {
            rejected("not a root stage");
            return Err(PipelineError::NotRootStage {
                stage: stage_name.to_string(),
            });
        }

        self.core.transmit(index, frame);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Number of live worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.core.event_bus
    }

    pub fn admission(&self) -> &Arc<StreamAdmission> {
        &self.core.admission
    }

    fn node(&self, stage_name: &str) -> Option<&StageNode> {
        self.core.index.get(stage_name).map(|&i| &self.core.nodes[i])
    }

    pub fn is_root_node(&self, stage_name: &str) -> bool {
        self.node(stage_name).map(StageNode::is_root).unwrap_or(false)
    }

    pub fn is_leaf_node(&self, stage_name: &str) -> bool {
        self.node(stage_name).map(StageNode::is_leaf).unwrap_or(false)
    }

    pub fn stage(&self, stage_name: &str) -> Option<Arc<dyn Stage>> {
        self.node(stage_name).map(|n| Arc::clone(&n.stage))
    }

    pub fn stage_config(&self, stage_name: &str) -> Option<&StageConfig> {
        self.node(stage_name).map(|n| &n.config)
    }

    pub fn stage_id(&self, stage_name: &str) -> Option<StageId> {
        self.node(stage_name).map(StageNode::id)
    }

    /// Stage names in declaration order
    pub fn stage_names(&self) -> Vec<&str> {
        self.core.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Input queue state of a non-root stage
    pub fn link_status(&self, stage_name: &str) -> Option<LinkStatus> {
        let connector = self.node(stage_name)?.connector.as_ref()?;
        Some(LinkStatus {
            stopped: connector.is_stopped(),
            cache_sizes: connector.sizes(),
        })
    }

    pub fn set_frame_done_callback<F>(&self, callback: F)
    where
        F: Fn(&FramePtr) + Send + Sync + 'static,
    {
        *self.core.frame_done.write() = Some(Arc::new(callback));
    }

    /// Observe stream-level messages: completed EOS, stage failures, stream
    /// errors and dropped invalid frames
    pub fn set_stream_msg_observer<F>(&self, observer: F)
    where
        F: Fn(&StreamMsg) + Send + Sync + 'static,
    {
        *self.core.stream_observer.write() = Some(Arc::new(observer));
    }

    pub fn set_perf_recorder(&self, recorder: Arc<dyn PerfRecorder>) {
        *self.core.perf_recorder.write() = Some(recorder);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Shutdown problems have already been logged
        let _ = self.stop();
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.core.name)
            .field("stages", &self.stage_names())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StageRegistry {
        StageRegistry::with_builtin_stages()
    }

    fn diamond() -> Vec<StageConfig> {
        vec![
            StageConfig::new("a", "pass_through").with_next(&["b", "c"]),
            StageConfig::new("b", "pass_through").with_next(&["d"]),
            StageConfig::new("c", "pass_through").with_next(&["d"]),
            StageConfig::new("d", "pass_through"),
        ]
    }

    #[test]
    fn test_build_computes_roots_leaves_and_masks() {
        let pipeline = Pipeline::new("diamond", &diamond(), &registry()).unwrap();

        assert!(pipeline.is_root_node("a"));
        assert!(!pipeline.is_root_node("d"));
        assert!(pipeline.is_leaf_node("d"));
        assert!(!pipeline.is_leaf_node("b"));
        assert!(!pipeline.is_root_node("missing"));
        assert_eq!(pipeline.stage_names(), vec!["a", "b", "c", "d"]);

        let ids: Vec<StageId> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| pipeline.stage_id(n).unwrap())
            .collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 4);

        let d = &pipeline.core.nodes[3];
        assert_eq!(d.parent_mask, StageMask::of(ids[1]).with(ids[2]));
        // A single root reaches everything
        assert!(pipeline.core.nodes[0].route_mask.is_empty());
        assert_eq!(pipeline.core.all_stages, StageMask::of(ids[0]).with(ids[1]).with(ids[2]).with(ids[3]));
    }

    #[test]
    fn test_route_masks_cover_unreachable_stages() {
        let stages = vec![
            StageConfig::new("cam", "pass_through").with_next(&["decode"]),
            StageConfig::new("file", "pass_through").with_next(&["parse"]),
            StageConfig::new("decode", "pass_through").with_next(&["sink"]),
            StageConfig::new("parse", "pass_through").with_next(&["sink"]),
            StageConfig::new("sink", "pass_through"),
        ];
        let pipeline = Pipeline::new("two_roots", &stages, &registry()).unwrap();
        let id = |n: &str| pipeline.stage_id(n).unwrap();

        let cam = &pipeline.core.nodes[0];
        assert_eq!(cam.route_mask, StageMask::of(id("file")).with(id("parse")));
        let file = &pipeline.core.nodes[1];
        assert_eq!(file.route_mask, StageMask::of(id("cam")).with(id("decode")));
    }

    #[test]
    fn test_connectors_only_on_non_root_stages() {
        let stages = vec![
            StageConfig::new("src", "pass_through").with_next(&["work"]).with_parallelism(3),
            StageConfig::new("work", "pass_through").with_parallelism(3).with_queue_size(7),
        ];
        let pipeline = Pipeline::new("p", &stages, &registry()).unwrap();

        assert!(pipeline.link_status("src").is_none());
        assert_eq!(
            pipeline.link_status("work"),
            Some(LinkStatus {
                stopped: false,
                cache_sizes: vec![0, 0, 0]
            })
        );
        assert!(pipeline.link_status("nope").is_none());
        assert_eq!(pipeline.stage_config("work").map(|c| c.max_input_queue_size), Some(7));
    }

    #[test]
    fn test_build_rejects_invalid_configs() {
        let err = Pipeline::new("empty", &[], &registry()).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));

        let cyclic = vec![
            StageConfig::new("a", "pass_through").with_next(&["b"]),
            StageConfig::new("b", "pass_through").with_next(&["c"]),
            StageConfig::new("c", "pass_through").with_next(&["b"]),
        ];
        let err = Pipeline::new("cyclic", &cyclic, &registry()).unwrap_err();
        assert!(err.to_string().contains("Cyclic link detected"));
    }

    #[test]
    fn test_build_rejects_bad_parameters() {
        let stages = vec![StageConfig::new("a", "pass_through").with_parameter("delay_ms", "soon")];
        match Pipeline::new("p", &stages, &registry()).unwrap_err() {
            PipelineError::Validation { errors, .. } => assert_eq!(
                errors,
                vec![ValidationError::InvalidParameters {
                    stage: "a".to_string()
                }]
            ),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_identities_return_to_shared_pool_on_drop() {
        let identities = StageIdentityPool::new();
        let config = PipelineConfig {
            name: "p".to_string(),
            flow_depth: 0,
            stages: diamond(),
        };
        let pipeline = Pipeline::build_with_services(
            &config,
            &registry(),
            Arc::new(StreamAdmission::new()),
            Arc::clone(&identities),
        )
        .unwrap();
        assert_eq!(identities.in_use().count(), 4);

        drop(pipeline);
        assert!(identities.in_use().is_empty());
    }

    #[test]
    fn test_provide_data_requires_running_root() {
        let pipeline = Pipeline::new("diamond", &diamond(), &registry()).unwrap();
        let frame = crate::frame::FrameUnit::create(pipeline.admission(), "s0", false, None).unwrap();

        assert!(matches!(
            pipeline.provide_data("a", Arc::clone(&frame)),
            Err(PipelineError::NotRunning { .. })
        ));

        pipeline.start().unwrap();
        assert!(matches!(
            pipeline.provide_data("b", Arc::clone(&frame)),
            Err(PipelineError::NotRootStage { .. })
        ));
        assert!(matches!(
            pipeline.provide_data("zz", Arc::clone(&frame)),
            Err(PipelineError::UnknownStage { .. })
        ));
        pipeline.stop().unwrap();
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let pipeline = Pipeline::new("diamond", &diamond(), &registry()).unwrap();
        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        assert_eq!(pipeline.workers.lock().len(), 3);
        assert!(pipeline.event_bus().is_running());

        pipeline.stop().unwrap();
        pipeline.stop().unwrap();
        assert!(!pipeline.is_running());
        assert!(pipeline.workers.lock().is_empty());
        assert!(!pipeline.event_bus().is_running());
        assert_eq!(pipeline.link_status("d").map(|s| s.stopped), Some(true));
    }

    #[test]
    fn test_worker_thread_names() {
        assert_eq!(worker_thread_name("decode", 1), "sl-decode-01");
        assert_eq!(worker_thread_name("a_very_long_stage_name", 12), "sl-a_very_lon-12");
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
