//! Analysis configuration
//!
//! An immutable bundle of per-task timing bounds and flag thresholds,
//! constructed once at session start and passed by reference to every
//! component. Every field has a documented default that an optional JSON
//! file can override; sections the file omits keep their defaults.

use crate::error::AnalysisError;
use crate::trial::TaskKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Admissible reaction-time window and hard response deadline for one task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBounds {
    pub min_rt_ms: u32,
    pub max_rt_ms: u32,
    pub timeout_ms: u32,
}

fn default_task_bounds() -> HashMap<TaskKind, TaskBounds> {
    let bounds = |min_rt_ms, max_rt_ms, timeout_ms| TaskBounds {
        min_rt_ms,
        max_rt_ms,
        timeout_ms,
    };
    HashMap::from([
        (TaskKind::Simple, bounds(100, 2000, 2500)),
        (TaskKind::Choice, bounds(150, 2000, 2500)),
        (TaskKind::GoNogo, bounds(100, 1500, 2000)),
        (TaskKind::Stroop, bounds(200, 3000, 3500)),
        (TaskKind::Pvt, bounds(100, 5000, 5000)),
        (TaskKind::Cpt, bounds(100, 2000, 2000)),
    ])
}

/// Threshold constants consumed by the state-flag engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsThresholds {
    // attention_scattered
    pub attention_cv_threshold: f64,
    pub attention_omission_threshold: f64,
    pub attention_lapse_threshold: f64,
    /// A valid RT above this counts as a lapse
    pub lapse_ms: u32,

    // aggressive_response_tactic
    pub aggressive_fast_mean_ms: u32,
    pub aggressive_error_rate_threshold: f64,
    pub aggressive_commission_threshold: f64,
    pub aggressive_wrong_threshold: f64,
    pub aggressive_anticipation_threshold: f64,

    // many_anticipations
    pub many_anticipations_threshold: f64,

    // post_error_slowing_detected
    pub pes_min_delta_ms: u32,
    pub pes_min_ratio: f64,

    // fatigue_trend_detected
    pub fatigue_slope_ms_per_trial: f64,
    pub fatigue_delta_ms: u32,

    // conservative_tactic
    pub conservative_slow_mean_ms: u32,
    pub conservative_error_rate_max: f64,
    pub conservative_omission_min: f64,
}

impl Default for FlagsThresholds {
    fn default() -> Self {
        Self {
            attention_cv_threshold: 0.30,
            attention_omission_threshold: 0.10,
            attention_lapse_threshold: 0.10,
            lapse_ms: 500,
            aggressive_fast_mean_ms: 320,
            aggressive_error_rate_threshold: 0.20,
            aggressive_commission_threshold: 0.20,
            aggressive_wrong_threshold: 0.20,
            aggressive_anticipation_threshold: 0.05,
            many_anticipations_threshold: 0.10,
            pes_min_delta_ms: 20,
            pes_min_ratio: 0.10,
            fatigue_slope_ms_per_trial: 1.0,
            fatigue_delta_ms: 30,
            conservative_slow_mean_ms: 600,
            conservative_error_rate_max: 0.10,
            conservative_omission_min: 0.10,
        }
    }
}

/// Reconstruction settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Length of the window before stimulus onset in which a press counts
    /// as premature
    pub premature_window_ms: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            premature_window_ms: 200,
        }
    }
}

/// Sensitivity-index settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DprimeConfig {
    /// Smooth hit/false-alarm proportions with `(count + 0.5)/(n + 1.0)`
    /// before inversion, avoiding infinite d' at 0% or 100% rates
    pub use_loglinear_correction: bool,
}

impl Default for DprimeConfig {
    fn default() -> Self {
        Self {
            use_loglinear_correction: true,
        }
    }
}

/// Complete configuration for one analysis run
///
/// Read-only after construction; safe to share across sessions processed by
/// independent workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub task_bounds: HashMap<TaskKind, TaskBounds>,
    pub flags_thresholds: FlagsThresholds,
    pub analysis: AnalysisConfig,
    pub dprime: DprimeConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            task_bounds: default_task_bounds(),
            flags_thresholds: FlagsThresholds::default(),
            analysis: AnalysisConfig::default(),
            dprime: DprimeConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Load configuration from an optional JSON file.
    ///
    /// `None` yields the built-in defaults. A path that cannot be read or
    /// parsed is fatal for the session.
    pub fn load(path: Option<&Path>) -> Result<Self, AnalysisError> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    AnalysisError::ConfigError(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_json(&text)
            }
        }
    }

    /// Parse configuration from a JSON string, filling omitted sections and
    /// task kinds from the defaults.
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let mut cfg: ProjectConfig =
            serde_json::from_str(json).map_err(|e| AnalysisError::ConfigError(e.to_string()))?;
        for (kind, bounds) in default_task_bounds() {
            cfg.task_bounds.entry(kind).or_insert(bounds);
        }
        Ok(cfg)
    }

    /// Bounds for a task kind, falling back to the `simple` set.
    pub fn bounds_for(&self, task: TaskKind) -> TaskBounds {
        if let Some(b) = self.task_bounds.get(&task) {
            return *b;
        }
        self.task_bounds
            .get(&TaskKind::Simple)
            .copied()
            .unwrap_or(TaskBounds {
                min_rt_ms: 100,
                max_rt_ms: 2000,
                timeout_ms: 2500,
            })
    }
}
