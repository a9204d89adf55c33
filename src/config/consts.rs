use std::time::Duration;

/// Default capacity of a single conveyor (frames per worker queue)
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;
/// Maximum number of stages in one pipeline (width of the visited mask)
pub const MAX_STAGES: usize = 64;
/// Flow depth of 0 means admission is unlimited
pub const UNLIMITED_FLOW_DEPTH: usize = 0;
/// Sleep between checks when blocking on an EOS marker
pub const EOS_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Slice the event bus waits for before re-checking its running flag
pub const EVENT_POLL_SLICE: Duration = Duration::from_millis(100);
/// Longest prefix of a stage name used in worker thread names
pub const WORKER_NAME_PREFIX_LEN: usize = 10;
