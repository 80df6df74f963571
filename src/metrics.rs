//! Session-level metric aggregation
//!
//! Computes counts, RT distribution statistics, rates and signal-detection
//! indices from the reconstructed trial list. Pure read aggregation: the
//! same trials and configuration always produce the same record, and every
//! rate whose denominator is zero is `None`, never a fabricated zero.

use crate::config::{ProjectConfig, TaskBounds};
use crate::stats;
use crate::trial::{Classification, TaskKind, TrialOutcome};
use serde::{Deserialize, Serialize};

/// Trial counts by classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCounts {
    pub total_trials: u32,
    pub correct: u32,
    pub wrong: u32,
    pub commission: u32,
    pub omission: u32,
    pub anticipation: u32,
    pub timeout: u32,
    /// go_nogo only; denominators for hit and omission rates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_trials: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nogo_trials: Option<u32>,
}

/// Reaction-time distribution statistics over the valid-RT subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtStats {
    pub n_valid: u32,
    pub mean_rt_ms: Option<f64>,
    pub median_rt_ms: Option<f64>,
    /// Sample standard deviation; undefined below 2 valid RTs
    pub rt_std_ms: Option<f64>,
    pub rt_cv: Option<f64>,
    /// Least-squares slope of valid RT against 1-indexed trial position,
    /// a fatigue proxy
    pub rt_slope_ms_per_trial: Option<f64>,
    /// Valid RTs above this threshold count as lapses
    pub lapse_threshold_ms: u32,
    pub lapse_count: u32,
    pub lapse_rate: Option<f64>,
}

/// Outcome rates; each `None` when its denominator is zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub accuracy: Option<f64>,
    pub omission_rate: Option<f64>,
    /// go_nogo only: commissions over no-go trials
    pub commission_error_rate: Option<f64>,
    pub timeout_rate: Option<f64>,
    pub anticipation_rate: Option<f64>,
}

/// Signal-detection indices, populated for go_nogo sessions
///
/// `false_alarm_rate` is numerically identical to the commission error rate;
/// both names are part of the summary contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDetection {
    pub hit_rate: Option<f64>,
    pub false_alarm_rate: Option<f64>,
    pub d_prime: Option<f64>,
}

/// Speed–accuracy trade-off indicators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedAccuracy {
    /// Pearson r between raw RT and 0/1 correctness over non-timeout trials
    /// with a recorded RT
    pub pearson_r_rt_correctness: Option<f64>,
}

/// Full per-session metric record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub counts: TrialCounts,
    pub rt: RtStats,
    pub rates: Rates,
    pub signal_detection: SignalDetection,
    pub speed_accuracy: SpeedAccuracy,
    pub bounds: TaskBounds,
}

fn rate(numerator: u32, denominator: u32) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(f64::from(numerator) / f64::from(denominator))
    }
}

/// Compute session metrics from the reconstructed trial list.
pub fn compute(trials: &[TrialOutcome], task: TaskKind, cfg: &ProjectConfig) -> SessionMetrics {
    let bounds = cfg.bounds_for(task);
    let total = trials.len() as u32;
    let correct = trials.iter().filter(|t| t.is_correct).count() as u32;
    let wrong = trials.iter().filter(|t| t.is_wrong).count() as u32;
    let commission = trials.iter().filter(|t| t.is_commission).count() as u32;
    let omission = trials.iter().filter(|t| t.is_omission).count() as u32;
    let anticipation = trials.iter().filter(|t| t.is_anticipation).count() as u32;
    let timeout = trials.iter().filter(|t| t.is_timeout).count() as u32;

    // go_nogo sessions rate omissions and timeouts against go trials only;
    // everywhere else a response is required on every trial
    let (go_trials, nogo_trials, required) = if task == TaskKind::GoNogo {
        let go = trials.iter().filter(|t| t.is_go == Some(true)).count() as u32;
        let nogo = trials.iter().filter(|t| t.is_go == Some(false)).count() as u32;
        (Some(go), Some(nogo), go)
    } else {
        (None, None, total)
    };

    let rt_valid: Vec<f64> = trials
        .iter()
        .filter(|t| t.is_valid_rt)
        .filter_map(|t| t.rt_ms)
        .collect();

    let mut xs = Vec::with_capacity(rt_valid.len());
    let mut ys = Vec::with_capacity(rt_valid.len());
    for (idx, t) in trials.iter().enumerate() {
        if t.is_valid_rt {
            if let Some(rt) = t.rt_ms {
                xs.push((idx + 1) as f64);
                ys.push(rt);
            }
        }
    }

    let lapse_threshold_ms = cfg.flags_thresholds.lapse_ms;
    let lapse_count = rt_valid
        .iter()
        .filter(|rt| **rt > f64::from(lapse_threshold_ms))
        .count() as u32;
    let lapse_rate = rate(lapse_count, rt_valid.len() as u32);

    let rt = RtStats {
        n_valid: rt_valid.len() as u32,
        mean_rt_ms: stats::mean(&rt_valid),
        median_rt_ms: stats::median(&rt_valid),
        rt_std_ms: stats::std_sample(&rt_valid),
        rt_cv: stats::coefficient_of_variation(&rt_valid),
        rt_slope_ms_per_trial: stats::linear_regression_slope(&xs, &ys),
        lapse_threshold_ms,
        lapse_count,
        lapse_rate,
    };

    let (commission_error_rate, signal_detection) = if task == TaskKind::GoNogo {
        let go = go_trials.unwrap_or(0);
        let nogo = nogo_trials.unwrap_or(0);
        let hits = trials
            .iter()
            .filter(|t| t.is_go == Some(true) && t.classification == Classification::Correct)
            .count() as u32;

        let hit_rate = rate(hits, go);
        let false_alarm_rate = rate(commission, nogo);
        let d_prime = match (hit_rate, false_alarm_rate) {
            (Some(hr), Some(fa)) => {
                let (hit_p, fa_p) = if cfg.dprime.use_loglinear_correction {
                    (
                        (f64::from(hits) + 0.5) / (f64::from(go) + 1.0),
                        (f64::from(commission) + 0.5) / (f64::from(nogo) + 1.0),
                    )
                } else {
                    (hr, fa)
                };
                Some(stats::inv_norm_cdf(hit_p) - stats::inv_norm_cdf(fa_p))
            }
            _ => None,
        };

        (
            rate(commission, nogo),
            SignalDetection {
                hit_rate,
                false_alarm_rate,
                d_prime,
            },
        )
    } else {
        (
            None,
            SignalDetection {
                hit_rate: None,
                false_alarm_rate: None,
                d_prime: None,
            },
        )
    };

    let rates = Rates {
        accuracy: rate(correct, total),
        omission_rate: rate(omission, required),
        commission_error_rate,
        timeout_rate: rate(timeout, required),
        anticipation_rate: rate(anticipation, total),
    };

    // speed–accuracy correlation includes invalid-but-non-timeout RTs
    let mut rt_all = Vec::new();
    let mut correctness = Vec::new();
    for t in trials {
        if let Some(rt) = t.rt_ms {
            if !t.is_timeout {
                rt_all.push(rt);
                correctness.push(if t.is_correct { 1.0 } else { 0.0 });
            }
        }
    }
    let speed_accuracy = SpeedAccuracy {
        pearson_r_rt_correctness: stats::pearson_r(&rt_all, &correctness),
    };

    SessionMetrics {
        counts: TrialCounts {
            total_trials: total,
            correct,
            wrong,
            commission,
            omission,
            anticipation,
            timeout,
            go_trials,
            nogo_trials,
        },
        rt,
        rates,
        signal_detection,
        speed_accuracy,
        bounds,
    }
}
