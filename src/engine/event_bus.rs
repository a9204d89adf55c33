// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline-wide publish/subscribe for faults, EOS notices and stop requests.
//!
//! Stages post [`Event`]s while the owning pipeline is running. The bus keeps
//! them in FIFO order until somebody calls [`EventBus::poll`]; it runs no
//! thread of its own. Whoever polls owns dispatch and hands each event to the
//! registered watchers through [`EventBus::notify_watchers`], or simply runs
//! [`EventBus::run_dispatch_loop`] on a thread of their choosing.
//!
//! # Examples
//!
//! ```rust
//! use the_streamline::engine::event_bus::{Event, EventBus, EventHandleFlag, EventType};
//!
//! let bus = EventBus::new();
//! bus.add_watcher(|event: &Event| {
//!     if event.event_type == EventType::Error {
//!         EventHandleFlag::Stop
//!     } else {
//!         EventHandleFlag::Synced
//!     }
//! });
//!
//! assert!(!bus.post(Event::new(EventType::Warning, "decoder", "late frame")));
//! bus.start();
//! assert!(bus.post(Event::new(EventType::Warning, "decoder", "late frame")));
//! assert_eq!(bus.poll().event_type, EventType::Warning);
//! bus.stop();
//! assert_eq!(bus.poll().event_type, EventType::Stop);
//! ```

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::SystemTime;

use crate::config::consts::EVENT_POLL_SLICE;
use crate::observability::messages::pipeline::{EventPostRejected, EventBusStopped};
use crate::observability::messages::StructuredLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A stage hit a fault; watchers decide whether it is fatal
    Error,
    /// Something unexpected but recoverable
    Warning,
    /// A stage forwarded the EOS of a stream
    Eos,
    /// A single stream failed while the pipeline keeps running
    StreamError,
    /// The bus is not running (synthesized by `poll`) or a stop was requested
    Stop,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Error => "error",
            EventType::Warning => "warning",
            EventType::Eos => "eos",
            EventType::StreamError => "stream_error",
            EventType::Stop => "stop",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub stream_id: String,
    pub stage_name: String,
    pub message: String,
    pub timestamp: SystemTime,
    pub thread_id: ThreadId,
}

impl Event {
    pub fn new(event_type: EventType, stage_name: &str, message: impl Into<String>) -> Self {
        Self {
            event_type,
            stream_id: String::new(),
            stage_name: stage_name.to_string(),
            message: message.into(),
            timestamp: SystemTime::now(),
            thread_id: thread::current().id(),
        }
    }

    pub fn with_stream(mut self, stream_id: &str) -> Self {
        self.stream_id = stream_id.to_string();
        self
    }

    fn stop() -> Self {
        Self::new(EventType::Stop, "", "event bus stopped")
    }
}

/// What a watcher did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandleFlag {
    /// The watcher ignored the event
    Null,
    /// The watcher consumed the event; later watchers are skipped
    Intercepted,
    /// The watcher handled the event and lets later watchers see it
    Synced,
    /// The watcher handled the event and asks the dispatch loop to end
    Stop,
}

pub type WatcherId = u64;

type Watcher = Arc<dyn Fn(&Event) -> EventHandleFlag + Send + Sync>;

pub struct EventBus {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    running: AtomicBool,
    watchers: Mutex<Vec<(WatcherId, Watcher)>>,
    next_watcher_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            running: AtomicBool::new(false),
            watchers: Mutex::new(Vec::new()),
            next_watcher_id: AtomicU64::new(1),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Stop accepting events and drop any that were never polled
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let dropped = self.receiver.try_iter().count();
            EventBusStopped { dropped_events: dropped }.log();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a watcher; the most recently added watcher is notified first
    pub fn add_watcher<F>(&self, watcher: F) -> WatcherId
    where
        F: Fn(&Event) -> EventHandleFlag + Send + Sync + 'static,
    {
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        self.watchers.lock().insert(0, (id, Arc::new(watcher)));
        id
    }

    pub fn remove_watcher(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.lock();
        let before = watchers.len();
        watchers.retain(|(watcher_id, _)| *watcher_id != id);
        watchers.len() != before
    }

    pub fn clear_watchers(&self) {
        self.watchers.lock().clear();
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Queue `event` for the next `poll`; fails while the bus is not running
    pub fn post(&self, event: Event) -> bool {
        if !self.is_running() {
            EventPostRejected {
                event_type: event.event_type,
                stage_name: &event.stage_name,
            }
            .log();
            return false;
        }
        self.sender.send(event).is_ok()
    }

    /// Wait for the next event.
    ///
    /// Waits in bounded slices so that a `stop` is noticed without a wake-up
    /// call; a bus that is (or becomes) stopped yields a synthetic
    /// [`EventType::Stop`] event.
    pub fn poll(&self) -> Event {
        while self.is_running() {
            match self.receiver.recv_timeout(EVENT_POLL_SLICE) {
                Ok(event) => return event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Event::stop()
    }

    /// Hand `event` to every watcher, most recent first.
    ///
    /// Stops at the first watcher that intercepts the event or asks to stop
    /// and returns that watcher's flag; otherwise returns the last flag seen.
    pub fn notify_watchers(&self, event: &Event) -> EventHandleFlag {
        // Clone the list so watchers may add or remove watchers themselves
        let watchers: Vec<Watcher> = self
            .watchers
            .lock()
            .iter()
            .map(|(_, watcher)| Arc::clone(watcher))
            .collect();

        let mut flag = EventHandleFlag::Null;
        for watcher in watchers {
            flag = watcher(event);
            if matches!(flag, EventHandleFlag::Intercepted | EventHandleFlag::Stop) {
                break;
            }
        }
        flag
    }

    /// Poll and dispatch until the bus stops or a watcher returns `Stop`.
    ///
    /// Returns the number of events dispatched.
    pub fn run_dispatch_loop(&self) -> usize {
        let mut dispatched = 0;
        loop {
            let event = self.poll();
            if event.event_type == EventType::Stop && !self.is_running() {
                break;
            }
            dispatched += 1;
            if self.notify_watchers(&event) == EventHandleFlag::Stop {
                break;
            }
        }
        dispatched
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("running", &self.is_running())
            .field("pending", &self.receiver.len())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}
