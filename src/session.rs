//! Session orchestration
//!
//! Sequences the pipeline for one session (reconstruct → aggregate → flag)
//! and persists the machine-readable summary document that downstream report
//! rendering consumes.

use crate::config::{ProjectConfig, TaskBounds};
use crate::error::AnalysisError;
use crate::flags::{self, StateFlags};
use crate::metrics::{self, SessionMetrics};
use crate::schema::{self, RawEvent};
use crate::trial::{self, TaskKind, TrialOutcome};
use crate::{PRODUCER_NAME, REFLEX_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Software that produced a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

impl Producer {
    fn current() -> Self {
        Producer {
            name: PRODUCER_NAME.to_string(),
            version: REFLEX_VERSION.to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Session-level metadata carried alongside the metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub log_path: String,
    pub task: TaskKind,
    /// Bounds actually applied during reconstruction
    pub bounds: TaskBounds,
    pub n_trials: u32,
    pub producer: Producer,
    pub computed_at_utc: String,
}

/// The stable machine-readable summary for one session
///
/// Downstream report rendering consumes this document; schema changes must
/// stay additive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub meta: SessionMeta,
    pub metrics: SessionMetrics,
    pub flags: StateFlags,
}

/// Everything the pipeline derives from one event log
#[derive(Debug, Clone)]
pub struct SessionAnalysis {
    pub summary: SessionSummary,
    pub trials: Vec<TrialOutcome>,
}

/// Run the full pipeline over an already-parsed event list.
pub fn analyze_events(
    events: &[RawEvent],
    log_path: &str,
    task: TaskKind,
    cfg: &ProjectConfig,
) -> SessionAnalysis {
    let trials = trial::reconstruct(events, task, cfg);
    debug!(
        n_events = events.len(),
        n_trials = trials.len(),
        "trials reconstructed"
    );
    let metrics = metrics::compute(&trials, task, cfg);
    let flags = flags::compute(&trials, &metrics, cfg);

    let meta = SessionMeta {
        log_path: log_path.to_string(),
        task,
        bounds: cfg.bounds_for(task),
        n_trials: trials.len() as u32,
        producer: Producer::current(),
        computed_at_utc: Utc::now().to_rfc3339(),
    };

    SessionAnalysis {
        summary: SessionSummary {
            meta,
            metrics,
            flags,
        },
        trials,
    }
}

/// Read, parse and analyze one session log.
///
/// The two fatal cases, an unparsable log line and an unreadable log file,
/// surface as errors; everything else degrades to absent fields inside the
/// summary.
pub fn analyze_log(
    log_path: &Path,
    task: TaskKind,
    cfg: &ProjectConfig,
) -> Result<SessionAnalysis, AnalysisError> {
    let text = fs::read_to_string(log_path)?;
    let events = schema::parse_ndjson(&text)?;
    info!(path = %log_path.display(), task = %task, "analyzing session log");
    Ok(analyze_events(
        &events,
        &log_path.to_string_lossy(),
        task,
        cfg,
    ))
}

impl SessionAnalysis {
    /// Persist the summary as `<out_dir>/<session-stem>/summary.json` and
    /// return the written path.
    pub fn write_summary(&self, out_dir: &Path) -> Result<PathBuf, AnalysisError> {
        let stem = Path::new(&self.summary.meta.log_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("session");
        let dir = out_dir.join(stem);
        fs::create_dir_all(&dir)?;
        let path = dir.join("summary.json");
        fs::write(&path, serde_json::to_string_pretty(&self.summary)?)?;
        info!(path = %path.display(), "summary written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::Classification;
    use pretty_assertions::assert_eq;

    /// A 10-trial simple session: every response correct at 300ms
    fn steady_simple_log() -> String {
        let mut lines = vec![r#"{"event_type":"session_start","t_mono":0.0}"#.to_string()];
        for i in 1..=10u32 {
            let t0 = i as f64 * 4.0;
            lines.push(format!(
                r#"{{"event_type":"stimulus_on","t_mono":{:.1},"trial_id":{},"block_id":1,"stimulus_type":"circle","expected_response":"space","timeout_ms":2500}}"#,
                t0, i
            ));
            lines.push(format!(
                r#"{{"event_type":"keypress","t_mono":{:.1},"trial_id":{},"button_id":"space"}}"#,
                t0 + 0.3,
                i
            ));
            lines.push(format!(
                r#"{{"event_type":"trial_end","t_mono":{:.1},"trial_id":{}}}"#,
                t0 + 3.0,
                i
            ));
        }
        lines.push(r#"{"event_type":"session_end","t_mono":60.0}"#.to_string());
        lines.join("\n")
    }

    #[test]
    fn test_steady_simple_session_end_to_end() {
        let events = schema::parse_ndjson(&steady_simple_log()).unwrap();
        let cfg = ProjectConfig::default();
        let analysis = analyze_events(&events, "logs/s1.jsonl", TaskKind::Simple, &cfg);

        let summary = &analysis.summary;
        assert_eq!(summary.meta.n_trials, 10);
        assert_eq!(summary.meta.task, TaskKind::Simple);
        assert_eq!(summary.meta.bounds.min_rt_ms, 100);
        assert_eq!(summary.meta.producer.name, "reflex");

        assert_eq!(summary.metrics.rates.accuracy, Some(1.0));
        assert_eq!(summary.metrics.rates.omission_rate, Some(0.0));
        let mean = summary.metrics.rt.mean_rt_ms.unwrap();
        assert!((mean - 300.0).abs() < 1e-6);
        let cv = summary.metrics.rt.rt_cv.unwrap();
        assert!(cv.abs() < 1e-9);
        assert!(!summary.flags.attention_scattered.value);

        assert_eq!(analysis.trials.len(), 10);
        assert!(analysis
            .trials
            .iter()
            .all(|t| t.classification == Classification::Correct));
    }

    #[test]
    fn test_malformed_log_aborts_without_summary() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("bad.jsonl");
        fs::write(
            &log_path,
            "{\"event_type\":\"session_start\",\"t_mono\":0.0}\n{broken\n",
        )
        .unwrap();

        let cfg = ProjectConfig::default();
        let result = analyze_log(&log_path, TaskKind::Simple, &cfg);
        assert!(matches!(
            result,
            Err(AnalysisError::MalformedEvent { line: 2, .. })
        ));

        // no summary directory may appear for an aborted analysis
        let reports = dir.path().join("reports");
        assert!(!reports.exists());
    }

    #[test]
    fn test_write_summary_layout() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("session_042.jsonl");
        fs::write(&log_path, steady_simple_log()).unwrap();

        let cfg = ProjectConfig::default();
        let analysis = analyze_log(&log_path, TaskKind::Simple, &cfg).unwrap();
        let out_dir = dir.path().join("reports");
        let written = analysis.write_summary(&out_dir).unwrap();

        assert_eq!(written, out_dir.join("session_042").join("summary.json"));
        let text = fs::read_to_string(&written).unwrap();
        let parsed: SessionSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, analysis.summary);
    }

    #[test]
    fn test_summary_round_trip_is_lossless() {
        let events = schema::parse_ndjson(&steady_simple_log()).unwrap();
        let cfg = ProjectConfig::default();
        let analysis = analyze_events(&events, "logs/s1.jsonl", TaskKind::Simple, &cfg);

        let json = serde_json::to_string(&analysis.summary).unwrap();
        let parsed: SessionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, analysis.summary);
    }

    #[test]
    fn test_task_without_bounds_falls_back_to_simple() {
        let mut cfg = ProjectConfig::default();
        cfg.task_bounds.remove(&TaskKind::Stroop);

        let events = schema::parse_ndjson(&steady_simple_log()).unwrap();
        let analysis = analyze_events(&events, "logs/s1.jsonl", TaskKind::Stroop, &cfg);
        assert_eq!(
            analysis.summary.meta.bounds,
            cfg.bounds_for(TaskKind::Simple)
        );
    }
}
