//! Event sinks
//!
//! The append-only write path the stimulus-presentation side logs through.
//! The analysis pipeline itself never writes events; these exist so event
//! producers and tests share one interface.

use crate::error::AnalysisError;
use crate::schema::RawEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination for a stream of session events
pub trait EventSink {
    fn emit(&mut self, event: &RawEvent) -> Result<(), AnalysisError>;
}

/// Appends one JSON line per event, creating parent directories on demand
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, event: &RawEvent) -> Result<(), AnalysisError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Collects events in memory; test double for the JSONL writer
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<RawEvent>,
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &RawEvent) -> Result<(), AnalysisError> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{self, EventType};

    #[test]
    fn test_memory_sink_collects_events() {
        let mut sink = MemorySink::default();
        sink.emit(&RawEvent::new(EventType::SessionStart, 0.0))
            .unwrap();
        sink.emit(&RawEvent::new(EventType::SessionEnd, 9.0)).unwrap();
        assert_eq!(sink.events.len(), 2);
        assert_eq!(sink.events[1].event_type, EventType::SessionEnd);
    }

    #[test]
    fn test_jsonl_sink_appends_parseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("session.jsonl");
        let mut sink = JsonlSink::new(&path);

        sink.emit(
            &RawEvent::new(EventType::StimulusOn, 1.5)
                .with_trial(1)
                .with_stimulus_type("circle")
                .with_timeout_ms(2500),
        )
        .unwrap();
        sink.emit(
            &RawEvent::new(EventType::Keypress, 1.8)
                .with_trial(1)
                .with_button("space"),
        )
        .unwrap();

        // what the sink writes, the parser must read back
        let text = std::fs::read_to_string(&path).unwrap();
        let events = schema::parse_ndjson(&text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::StimulusOn);
        assert_eq!(events[1].button_id.as_deref(), Some("space"));
    }
}
