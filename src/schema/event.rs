//! rt.event.v1 event record and NDJSON parsing

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current event schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Session lifecycle markers and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    TrialStart,
    StimulusOn,
    StimulusOff,
    Keypress,
    TrialEnd,
    SessionEnd,
}

/// One record from the session event log
///
/// `event_type` and `t_mono` are required; the rest is present only on the
/// events that carry it. Producer fields the pipeline does not interpret are
/// preserved in `extra` and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: EventType,
    /// Monotonic timestamp, seconds since session start. Used for ordering
    /// and interval arithmetic only, never as wall-clock time.
    pub t_mono: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Wall-clock seconds at emit time, carried for audit only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_unix: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<u32>,

    // stimulus_on payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stimulus_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_go: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u32>,

    // keypress payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_id: Option<String>,

    /// Unknown producer fields, preserved for transparency
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RawEvent {
    /// Create a bare event with only the required fields set
    pub fn new(event_type: EventType, t_mono: f64) -> Self {
        RawEvent {
            event_type,
            t_mono,
            schema_version: Some(SCHEMA_VERSION),
            instrument: None,
            session_id: None,
            run_id: None,
            t_unix: None,
            trial_id: None,
            block_id: None,
            stimulus_type: None,
            expected_response: None,
            is_go: None,
            timeout_ms: None,
            button_id: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_trial(mut self, trial_id: u32) -> Self {
        self.trial_id = Some(trial_id);
        self
    }

    pub fn with_block(mut self, block_id: u32) -> Self {
        self.block_id = Some(block_id);
        self
    }

    pub fn with_stimulus_type(mut self, stimulus_type: impl Into<String>) -> Self {
        self.stimulus_type = Some(stimulus_type.into());
        self
    }

    pub fn with_expected_response(mut self, expected: impl Into<String>) -> Self {
        self.expected_response = Some(expected.into());
        self
    }

    pub fn with_is_go(mut self, is_go: bool) -> Self {
        self.is_go = Some(is_go);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_button(mut self, button_id: impl Into<String>) -> Self {
        self.button_id = Some(button_id.into());
        self
    }
}

/// Parse a line-delimited JSON event log.
///
/// Blank lines are skipped. A line that fails to parse as an event record is
/// fatal for the whole log; corrupted records are never silently dropped.
pub fn parse_ndjson(input: &str) -> Result<Vec<RawEvent>, AnalysisError> {
    let mut events = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .map_err(|source| AnalysisError::MalformedEvent {
                line: idx + 1,
                source,
            })?;
        events.push(event);
    }
    Ok(events)
}
