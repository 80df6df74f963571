//! Behavioral state-flag engine
//!
//! Applies threshold heuristics to the session metrics, plus two derived
//! sub-analyses (post-error slowing and a first/last-third fatigue split),
//! to produce named boolean flags. Each flag carries the human-readable
//! clauses that fired; an absent input deactivates only the clause that
//! depends on it, never the whole flag.

use crate::config::ProjectConfig;
use crate::metrics::SessionMetrics;
use crate::stats;
use crate::trial::{Classification, TrialOutcome};
use serde::{Deserialize, Serialize};

/// Minimum valid-RT samples before the first/last-third split is attempted
const FATIGUE_SPLIT_MIN_SAMPLES: usize = 6;

/// RT buckets keyed on whether the preceding trial was an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostErrorSlowing {
    pub after_error_n: u32,
    pub after_correct_n: u32,
    pub after_error_mean_rt_ms: Option<f64>,
    pub after_correct_mean_rt_ms: Option<f64>,
    /// `mean(after error) - mean(after correct)`; `None` if either bucket
    /// is empty
    pub delta_ms: Option<f64>,
}

/// RT trend indicators over the course of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueTrend {
    pub slope_ms_per_trial: Option<f64>,
    pub first_third_mean_rt_ms: Option<f64>,
    pub last_third_mean_rt_ms: Option<f64>,
    pub delta_ms: Option<f64>,
}

/// A named flag with the clauses that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFlag {
    pub value: bool,
    pub reasons: Vec<String>,
}

impl StateFlag {
    fn from_reasons(reasons: Vec<String>) -> Self {
        StateFlag {
            value: !reasons.is_empty(),
            reasons,
        }
    }
}

/// Post-error-slowing flag with its numeric sub-record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostErrorSlowingFlag {
    pub value: bool,
    pub reasons: Vec<String>,
    pub details: PostErrorSlowing,
}

/// Fatigue flag with its numeric sub-record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueFlag {
    pub value: bool,
    pub reasons: Vec<String>,
    pub details: FatigueTrend,
}

/// The complete set of behavioral state flags for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFlags {
    pub attention_scattered: StateFlag,
    pub aggressive_response_tactic: StateFlag,
    pub many_anticipations: StateFlag,
    pub post_error_slowing_detected: PostErrorSlowingFlag,
    pub fatigue_trend_detected: FatigueFlag,
    pub conservative_tactic: StateFlag,
}

/// Bucket each valid RT by whether the preceding trial was an error.
pub fn compute_post_error_slowing(trials: &[TrialOutcome]) -> PostErrorSlowing {
    let mut after_error = Vec::new();
    let mut after_correct = Vec::new();

    for pair in trials.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if !cur.is_valid_rt {
            continue;
        }
        let Some(rt) = cur.rt_ms else { continue };
        if prev_is_error(prev) {
            after_error.push(rt);
        } else if prev.is_correct {
            after_correct.push(rt);
        }
    }

    let after_error_mean_rt_ms = stats::mean(&after_error);
    let after_correct_mean_rt_ms = stats::mean(&after_correct);
    let delta_ms = match (after_error_mean_rt_ms, after_correct_mean_rt_ms) {
        (Some(e), Some(c)) => Some(e - c),
        _ => None,
    };

    PostErrorSlowing {
        after_error_n: after_error.len() as u32,
        after_correct_n: after_correct.len() as u32,
        after_error_mean_rt_ms,
        after_correct_mean_rt_ms,
        delta_ms,
    }
}

fn prev_is_error(t: &TrialOutcome) -> bool {
    !t.is_correct
        && matches!(
            t.classification,
            Classification::Wrong
                | Classification::Commission
                | Classification::Omission
                | Classification::Timeout
                | Classification::Anticipation
        )
}

/// Compare the first and last third of the valid-RT sequence.
///
/// The split needs at least [`FATIGUE_SPLIT_MIN_SAMPLES`] samples; each
/// third is `floor(n/3)` values, never fewer than one.
pub fn compute_fatigue_trend(trials: &[TrialOutcome], slope: Option<f64>) -> FatigueTrend {
    let valid: Vec<f64> = trials
        .iter()
        .filter(|t| t.is_valid_rt)
        .filter_map(|t| t.rt_ms)
        .collect();

    let mut trend = FatigueTrend {
        slope_ms_per_trial: slope,
        first_third_mean_rt_ms: None,
        last_third_mean_rt_ms: None,
        delta_ms: None,
    };

    if valid.len() >= FATIGUE_SPLIT_MIN_SAMPLES {
        let third = (valid.len() / 3).max(1);
        let first = stats::mean(&valid[..third]);
        let last = stats::mean(&valid[valid.len() - third..]);
        trend.first_third_mean_rt_ms = first;
        trend.last_third_mean_rt_ms = last;
        if let (Some(f), Some(l)) = (first, last) {
            trend.delta_ms = Some(l - f);
        }
    }

    trend
}

/// Evaluate all state flags for one session.
pub fn compute(
    trials: &[TrialOutcome],
    metrics: &SessionMetrics,
    cfg: &ProjectConfig,
) -> StateFlags {
    let th = &cfg.flags_thresholds;

    let mean_rt = metrics.rt.mean_rt_ms;
    let rt_cv = metrics.rt.rt_cv;
    let lapse_rate = metrics.rt.lapse_rate;
    let omission_rate = metrics.rates.omission_rate;
    let commission_rate = metrics.rates.commission_error_rate;
    let anticipation_rate = metrics.rates.anticipation_rate;
    let error_rate = match (metrics.rates.accuracy, metrics.counts.total_trials) {
        (Some(accuracy), total) if total > 0 => Some(1.0 - accuracy),
        _ => None,
    };

    // attention_scattered: variable RTs, missed stimuli or frequent lapses
    let mut reasons = Vec::new();
    if let Some(cv) = rt_cv {
        if cv >= th.attention_cv_threshold {
            reasons.push(format!("rt_cv={:.3} >= {}", cv, th.attention_cv_threshold));
        }
    }
    if let Some(omi) = omission_rate {
        if omi >= th.attention_omission_threshold {
            reasons.push(format!(
                "omission_rate={:.3} >= {}",
                omi, th.attention_omission_threshold
            ));
        }
    }
    if let Some(lr) = lapse_rate {
        if lr >= th.attention_lapse_threshold {
            reasons.push(format!(
                "lapse_rate={:.3} >= {} (lapse > {}ms)",
                lr, th.attention_lapse_threshold, th.lapse_ms
            ));
        }
    }
    let attention_scattered = StateFlag::from_reasons(reasons);

    // aggressive_response_tactic: fast responding paired with error pressure
    let mut reasons = Vec::new();
    if mean_rt.is_some_and(|m| m <= f64::from(th.aggressive_fast_mean_ms)) {
        if error_rate.is_some_and(|e| e >= th.aggressive_error_rate_threshold) {
            reasons.push("fast mean RT + high error rate".to_string());
        }
        if commission_rate.is_some_and(|c| c >= th.aggressive_commission_threshold) {
            reasons.push("fast mean RT + frequent commissions (no-go)".to_string());
        }
        if anticipation_rate.is_some_and(|a| a >= th.aggressive_anticipation_threshold) {
            reasons.push("fast mean RT + frequent anticipations".to_string());
        }
    }
    let aggressive_response_tactic = StateFlag::from_reasons(reasons);

    // many_anticipations
    let mut reasons = Vec::new();
    if let Some(ar) = anticipation_rate {
        if ar >= th.many_anticipations_threshold {
            reasons.push(format!(
                "anticipation_rate={:.3} >= {}",
                ar, th.many_anticipations_threshold
            ));
        }
    }
    let many_anticipations = StateFlag::from_reasons(reasons);

    // post_error_slowing_detected: delta must clear both the absolute and
    // the baseline-relative threshold
    let pes = compute_post_error_slowing(trials);
    let mut reasons = Vec::new();
    if let (Some(delta), Some(baseline)) = (pes.delta_ms, pes.after_correct_mean_rt_ms) {
        if delta >= f64::from(th.pes_min_delta_ms) && delta >= th.pes_min_ratio * baseline {
            reasons.push(format!("delta={:.1}ms, baseline={:.1}ms", delta, baseline));
        }
    }
    let post_error_slowing_detected = PostErrorSlowingFlag {
        value: !reasons.is_empty(),
        reasons,
        details: pes,
    };

    // fatigue_trend_detected: rising RT trend or late-session slowdown
    let fatigue = compute_fatigue_trend(trials, metrics.rt.rt_slope_ms_per_trial);
    let mut reasons = Vec::new();
    if let Some(slope) = fatigue.slope_ms_per_trial {
        if slope >= th.fatigue_slope_ms_per_trial {
            reasons.push(format!("slope={:.2} ms/trial", slope));
        }
    }
    if let Some(delta) = fatigue.delta_ms {
        if delta >= f64::from(th.fatigue_delta_ms) {
            reasons.push(format!("last_third - first_third = {:.1}ms", delta));
        }
    }
    let fatigue_trend_detected = FatigueFlag {
        value: !reasons.is_empty(),
        reasons,
        details: fatigue,
    };

    // conservative_tactic: slow, nearly error-free, yet letting stimuli pass
    let mut reasons = Vec::new();
    if mean_rt.is_some_and(|m| m >= f64::from(th.conservative_slow_mean_ms))
        && error_rate.is_some_and(|e| e <= th.conservative_error_rate_max)
        && omission_rate.is_some_and(|o| o >= th.conservative_omission_min)
    {
        reasons.push("slow, nearly error-free, but frequent omissions".to_string());
    }
    let conservative_tactic = StateFlag::from_reasons(reasons);

    StateFlags {
        attention_scattered,
        aggressive_response_tactic,
        many_anticipations,
        post_error_slowing_detected,
        fatigue_trend_detected,
        conservative_tactic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use crate::trial::TaskKind;

    fn base_trial(id: u32) -> TrialOutcome {
        TrialOutcome {
            trial_id: id,
            block_id: 1,
            stimulus_type: "circle".to_string(),
            expected_response: Some("space".to_string()),
            is_go: None,
            timeout_ms: 2500,
            first_press_t: None,
            first_press_button: None,
            rt_ms: None,
            press_count: 0,
            premature_press_count: 0,
            late_press_count: 0,
            classification: Classification::Unknown,
            is_correct: false,
            is_valid_rt: false,
            is_anticipation: false,
            is_timeout: false,
            is_wrong: false,
            is_commission: false,
            is_omission: false,
        }
    }

    fn correct_trial(id: u32, rt_ms: f64) -> TrialOutcome {
        TrialOutcome {
            rt_ms: Some(rt_ms),
            first_press_button: Some("space".to_string()),
            press_count: 1,
            classification: Classification::Correct,
            is_correct: true,
            is_valid_rt: true,
            ..base_trial(id)
        }
    }

    fn wrong_trial(id: u32, rt_ms: f64) -> TrialOutcome {
        TrialOutcome {
            rt_ms: Some(rt_ms),
            first_press_button: Some("other".to_string()),
            press_count: 1,
            classification: Classification::Wrong,
            is_wrong: true,
            ..base_trial(id)
        }
    }

    fn omission_trial(id: u32) -> TrialOutcome {
        TrialOutcome {
            classification: Classification::Omission,
            is_omission: true,
            is_timeout: true,
            ..base_trial(id)
        }
    }

    fn flags_for(trials: &[TrialOutcome], task: TaskKind) -> StateFlags {
        let cfg = ProjectConfig::default();
        let m = metrics::compute(trials, task, &cfg);
        compute(trials, &m, &cfg)
    }

    #[test]
    fn test_steady_session_raises_no_flags() {
        let trials: Vec<TrialOutcome> = (1..=10).map(|i| correct_trial(i, 300.0)).collect();
        let flags = flags_for(&trials, TaskKind::Simple);

        assert!(!flags.attention_scattered.value);
        assert!(!flags.aggressive_response_tactic.value);
        assert!(!flags.many_anticipations.value);
        assert!(!flags.post_error_slowing_detected.value);
        assert!(!flags.fatigue_trend_detected.value);
        assert!(!flags.conservative_tactic.value);
        assert!(flags.attention_scattered.reasons.is_empty());
    }

    #[test]
    fn test_post_error_slowing_buckets() {
        let trials = vec![
            correct_trial(1, 300.0),
            correct_trial(2, 310.0), // after correct
            wrong_trial(3, 280.0),
            correct_trial(4, 420.0), // after error
            correct_trial(5, 300.0), // after correct
        ];
        let pes = compute_post_error_slowing(&trials);
        assert_eq!(pes.after_error_n, 1);
        assert_eq!(pes.after_correct_n, 2);
        assert_eq!(pes.after_error_mean_rt_ms, Some(420.0));
        assert_eq!(pes.after_correct_mean_rt_ms, Some(305.0));
        assert_eq!(pes.delta_ms, Some(115.0));
    }

    #[test]
    fn test_post_error_slowing_empty_bucket_gives_no_delta() {
        let trials = vec![correct_trial(1, 300.0), correct_trial(2, 310.0)];
        let pes = compute_post_error_slowing(&trials);
        assert_eq!(pes.after_error_n, 0);
        assert_eq!(pes.delta_ms, None);
    }

    #[test]
    fn test_post_error_slowing_flag_fires() {
        // after-correct baseline ~300ms, after-error ~420ms: delta 120ms
        // clears both the 20ms absolute and the 10%-of-baseline threshold
        let trials = vec![
            correct_trial(1, 300.0),
            correct_trial(2, 300.0),
            wrong_trial(3, 280.0),
            correct_trial(4, 420.0),
            correct_trial(5, 300.0),
            wrong_trial(6, 280.0),
            correct_trial(7, 420.0),
        ];
        let flags = flags_for(&trials, TaskKind::Simple);
        assert!(flags.post_error_slowing_detected.value);
        assert_eq!(flags.post_error_slowing_detected.details.after_error_n, 2);
        assert_eq!(flags.post_error_slowing_detected.reasons.len(), 1);
    }

    #[test]
    fn test_fatigue_split_needs_six_samples() {
        let trials: Vec<TrialOutcome> = (1..=5).map(|i| correct_trial(i, 300.0)).collect();
        let trend = compute_fatigue_trend(&trials, None);
        assert_eq!(trend.first_third_mean_rt_ms, None);
        assert_eq!(trend.delta_ms, None);
    }

    #[test]
    fn test_fatigue_split_means() {
        // 9 valid RTs: thirds of size 3
        let rts = [200.0, 210.0, 220.0, 400.0, 400.0, 400.0, 500.0, 510.0, 520.0];
        let trials: Vec<TrialOutcome> = rts
            .iter()
            .enumerate()
            .map(|(i, rt)| correct_trial(i as u32 + 1, *rt))
            .collect();
        let trend = compute_fatigue_trend(&trials, None);
        assert_eq!(trend.first_third_mean_rt_ms, Some(210.0));
        assert_eq!(trend.last_third_mean_rt_ms, Some(510.0));
        assert_eq!(trend.delta_ms, Some(300.0));
    }

    #[test]
    fn test_fatigue_flag_from_slope() {
        // RTs rising 50ms per trial: slope 50 >= 1.0 ms/trial threshold
        let trials: Vec<TrialOutcome> = (0..9u32)
            .map(|i| correct_trial(i + 1, 200.0 + 50.0 * f64::from(i)))
            .collect();
        let flags = flags_for(&trials, TaskKind::Simple);
        assert!(flags.fatigue_trend_detected.value);
        // both the slope clause and the split clause fire here
        assert_eq!(flags.fatigue_trend_detected.reasons.len(), 2);
        let slope = flags.fatigue_trend_detected.details.slope_ms_per_trial.unwrap();
        assert!((slope - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_attention_flag_from_omissions() {
        // 3 omissions in 10 trials: omission_rate 0.3 >= 0.1
        let mut trials: Vec<TrialOutcome> = (1..=7).map(|i| correct_trial(i, 300.0)).collect();
        trials.extend((8..=10).map(omission_trial));
        let flags = flags_for(&trials, TaskKind::Simple);
        assert!(flags.attention_scattered.value);
        assert!(flags.attention_scattered.reasons[0].contains("omission_rate"));
    }

    #[test]
    fn test_attention_flag_from_variable_rts() {
        // alternating 150/900ms gives a coefficient of variation above 0.30
        let trials: Vec<TrialOutcome> = (1..=10u32)
            .map(|i| correct_trial(i, if i % 2 == 0 { 900.0 } else { 150.0 }))
            .collect();
        let flags = flags_for(&trials, TaskKind::Simple);
        assert!(flags.attention_scattered.value);
        assert!(flags.attention_scattered.reasons.iter().any(|r| r.contains("rt_cv")));
    }

    #[test]
    fn test_aggressive_flag_on_fast_commissions() {
        // go_nogo: 8 fast hits at 250ms + 1 commission / 2 no-go trials
        let mut trials: Vec<TrialOutcome> = (1..=8u32)
            .map(|i| TrialOutcome {
                is_go: Some(true),
                ..correct_trial(i, 250.0)
            })
            .collect();
        trials.push(TrialOutcome {
            is_go: Some(false),
            rt_ms: Some(150.0),
            first_press_button: Some("space".to_string()),
            press_count: 1,
            classification: Classification::Commission,
            is_commission: true,
            ..base_trial(9)
        });
        trials.push(TrialOutcome {
            is_go: Some(false),
            classification: Classification::CorrectInhibition,
            is_correct: true,
            ..base_trial(10)
        });

        let flags = flags_for(&trials, TaskKind::GoNogo);
        assert!(flags.aggressive_response_tactic.value);
        assert!(flags
            .aggressive_response_tactic
            .reasons
            .iter()
            .any(|r| r.contains("commissions")));
    }

    #[test]
    fn test_conservative_flag() {
        // slow but accurate responding with omissions right at the minimum:
        // 1 omission in 10 trials keeps error_rate at the 0.10 ceiling while
        // meeting the 0.10 omission floor
        let mut trials: Vec<TrialOutcome> = (1..=9).map(|i| correct_trial(i, 700.0)).collect();
        trials.push(omission_trial(10));
        let flags = flags_for(&trials, TaskKind::Simple);
        assert!(flags.conservative_tactic.value);
        assert_eq!(flags.conservative_tactic.reasons.len(), 1);
    }

    #[test]
    fn test_many_anticipations_flag() {
        let mut trials: Vec<TrialOutcome> = (1..=8).map(|i| correct_trial(i, 400.0)).collect();
        trials.push(TrialOutcome {
            rt_ms: Some(50.0),
            classification: Classification::Anticipation,
            is_anticipation: true,
            ..base_trial(9)
        });
        trials.push(TrialOutcome {
            rt_ms: Some(60.0),
            classification: Classification::Anticipation,
            is_anticipation: true,
            ..base_trial(10)
        });
        let flags = flags_for(&trials, TaskKind::Simple);
        assert!(flags.many_anticipations.value);
        assert!(flags.many_anticipations.reasons[0].contains("anticipation_rate"));
    }

    #[test]
    fn test_flags_round_trip() {
        let trials: Vec<TrialOutcome> = (1..=10).map(|i| correct_trial(i, 300.0)).collect();
        let flags = flags_for(&trials, TaskKind::Simple);
        let json = serde_json::to_string(&flags).unwrap();
        let parsed: StateFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, flags);
    }
}
