// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-frame timing records.
//!
//! The pipeline emits a [`PerfEvent`] with [`PerfPhase::Enter`] right before a
//! stage processes a frame and one with [`PerfPhase::Exit`] right after the
//! frame has been forwarded. Records are keyed by `(stream_id, stage_name)`;
//! pairing them up is left to whoever consumes the records.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::traits::PerfRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfPhase {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfEvent {
    pub stream_id: String,
    pub stage_name: String,
    pub phase: PerfPhase,
    /// Microseconds since the Unix epoch
    pub timestamp_us: u64,
}

impl PerfEvent {
    pub fn now(stream_id: &str, stage_name: &str, phase: PerfPhase) -> Self {
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            stream_id: stream_id.to_string(),
            stage_name: stage_name.to_string(),
            phase,
            timestamp_us,
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryPerfRecorder {
    events: Mutex<Vec<PerfEvent>>,
}

impl MemoryPerfRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PerfEvent> {
        self.events.lock().clone()
    }

    /// Records of one stage for one stream, in arrival order
    pub fn events_for(&self, stream_id: &str, stage_name: &str) -> Vec<PerfEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.stream_id == stream_id && e.stage_name == stage_name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PerfRecorder for MemoryPerfRecorder {
    fn record(&self, event: PerfEvent) {
        self.events.lock().push(event);
    }
}

/// Writes each record as one JSON object per line.
pub struct JsonLinesPerfRecorder<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPerfRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> PerfRecorder for JsonLinesPerfRecorder<W> {
    fn record(&self, event: PerfEvent) {
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(
                stream_id = %event.stream_id,
                stage_name = %event.stage_name,
                error = %e,
                "Failed to write perf record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_recorder_filters_by_key() {
        let recorder = MemoryPerfRecorder::new();
        recorder.record(PerfEvent::now("s0", "decode", PerfPhase::Enter));
        recorder.record(PerfEvent::now("s1", "decode", PerfPhase::Enter));
        recorder.record(PerfEvent::now("s0", "decode", PerfPhase::Exit));
        recorder.record(PerfEvent::now("s0", "detect", PerfPhase::Enter));

        let decode_s0 = recorder.events_for("s0", "decode");
        assert_eq!(decode_s0.len(), 2);
        assert_eq!(decode_s0[0].phase, PerfPhase::Enter);
        assert_eq!(decode_s0[1].phase, PerfPhase::Exit);
        assert!(decode_s0[0].timestamp_us <= decode_s0[1].timestamp_us);

        assert_eq!(recorder.len(), 4);
        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_json_lines_recorder_writes_one_object_per_line() {
        let recorder = JsonLinesPerfRecorder::new(Vec::new());
        recorder.record(PerfEvent {
            stream_id: "cam-0".to_string(),
            stage_name: "decode".to_string(),
            phase: PerfPhase::Enter,
            timestamp_us: 10,
        });
        recorder.record(PerfEvent {
            stream_id: "cam-0".to_string(),
            stage_name: "decode".to_string(),
            phase: PerfPhase::Exit,
            timestamp_us: 25,
        });

        let output = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: PerfEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.phase, PerfPhase::Enter);
        assert_eq!(first.timestamp_us, 10);
        assert!(lines[1].contains("\"phase\":\"exit\""));
    }
}
