//! Trial reconstruction and classification
//!
//! Groups raw events by trial, derives one immutable [`TrialOutcome`] per
//! trial, and classifies it against the task's timing rules. Task-dependent
//! behavior is resolved once per session into a [`ResponseRule`] so the
//! per-trial scoring never branches on strings.

use crate::config::{ProjectConfig, TaskBounds};
use crate::error::AnalysisError;
use crate::schema::{EventType, RawEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// The button a go_nogo go-trial must be answered with
const GO_BUTTON: &str = "space";

/// Task kinds understood by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Simple,
    Choice,
    GoNogo,
    Stroop,
    Pvt,
    Cpt,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Simple,
        TaskKind::Choice,
        TaskKind::GoNogo,
        TaskKind::Stroop,
        TaskKind::Pvt,
        TaskKind::Cpt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Simple => "simple",
            TaskKind::Choice => "choice",
            TaskKind::GoNogo => "go_nogo",
            TaskKind::Stroop => "stroop",
            TaskKind::Pvt => "pvt",
            TaskKind::Cpt => "cpt",
        }
    }

    /// How responses are scored for this task kind
    fn response_rule(&self) -> ResponseRule {
        match self {
            TaskKind::Simple | TaskKind::Choice => ResponseRule::MatchExpected,
            TaskKind::GoNogo => ResponseRule::GoNogo {
                go_button: GO_BUTTON,
            },
            // stroop/pvt/cpt carry no expected-button concept; any in-window
            // press counts as a response to the stimulus
            TaskKind::Stroop | TaskKind::Pvt | TaskKind::Cpt => ResponseRule::AnyPress,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AnalysisError::UnknownTaskKind(s.to_string()))
    }
}

/// Response-scoring strategy selected by task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseRule {
    /// The scored button must equal the trial's expected response
    MatchExpected,
    /// Go trials expect the fixed go button; no-go trials expect silence
    GoNogo { go_button: &'static str },
    /// Any in-window press counts as correct
    AnyPress,
}

/// Final classification of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Correct,
    Wrong,
    Omission,
    Timeout,
    Anticipation,
    Commission,
    CorrectInhibition,
    Unknown,
}

/// Outcome of one stimulus-response cycle
///
/// Constructed once during reconstruction and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub trial_id: u32,
    pub block_id: u32,
    pub stimulus_type: String,
    pub expected_response: Option<String>,
    /// `Some(true)` go, `Some(false)` no-go, `None` not applicable
    pub is_go: Option<bool>,
    pub timeout_ms: u32,
    /// Absolute time of the scored press
    pub first_press_t: Option<f64>,
    pub first_press_button: Option<String>,
    /// Latency of the scored press relative to stimulus onset
    pub rt_ms: Option<f64>,
    pub press_count: u32,
    pub premature_press_count: u32,
    pub late_press_count: u32,
    pub classification: Classification,
    pub is_correct: bool,
    pub is_valid_rt: bool,
    pub is_anticipation: bool,
    pub is_timeout: bool,
    pub is_wrong: bool,
    pub is_commission: bool,
    pub is_omission: bool,
}

/// Classification scratch state, folded into the outcome on construction
#[derive(Debug, Default)]
struct Verdict {
    classification: Option<Classification>,
    is_correct: bool,
    is_anticipation: bool,
    is_timeout: bool,
    is_wrong: bool,
    is_commission: bool,
    is_omission: bool,
}

/// Reconstruct per-trial outcomes from the raw event stream of one session.
///
/// Events without a trial id are ignored. A trial without a `stimulus_on`
/// event is dropped entirely; it cannot be scored and its absence is an
/// expected artifact of partial logging, not an error. Trials come back in
/// ascending trial-id order.
pub fn reconstruct(events: &[RawEvent], task: TaskKind, cfg: &ProjectConfig) -> Vec<TrialOutcome> {
    let bounds = cfg.bounds_for(task);
    let premature_window_s = cfg.analysis.premature_window_ms as f64 / 1000.0;
    let rule = task.response_rule();

    let groups = group_by_trial(events);
    let mut outcomes = Vec::with_capacity(groups.len());
    for (trial_id, evs) in groups {
        let Some(stim_on) = evs.iter().find(|e| e.event_type == EventType::StimulusOn) else {
            debug!(trial_id, "dropping trial without stimulus_on");
            continue;
        };
        outcomes.push(score_trial(
            trial_id,
            stim_on,
            &evs,
            rule,
            bounds,
            premature_window_s,
        ));
    }
    outcomes
}

/// Partition events by trial id and sort each partition by `t_mono`.
/// The sort is stable, so events with equal timestamps keep file order.
fn group_by_trial(events: &[RawEvent]) -> BTreeMap<u32, Vec<&RawEvent>> {
    let mut groups: BTreeMap<u32, Vec<&RawEvent>> = BTreeMap::new();
    for ev in events {
        if let Some(tid) = ev.trial_id {
            groups.entry(tid).or_default().push(ev);
        }
    }
    for evs in groups.values_mut() {
        evs.sort_by(|a, b| a.t_mono.total_cmp(&b.t_mono));
    }
    groups
}

fn score_trial(
    trial_id: u32,
    stim_on: &RawEvent,
    evs: &[&RawEvent],
    rule: ResponseRule,
    bounds: TaskBounds,
    premature_window_s: f64,
) -> TrialOutcome {
    let timeout_ms = stim_on.timeout_ms.unwrap_or(bounds.timeout_ms);
    let t0 = stim_on.t_mono;
    let t1 = t0 + timeout_ms as f64 / 1000.0;

    let presses: Vec<(f64, &str)> = evs
        .iter()
        .filter(|e| e.event_type == EventType::Keypress)
        .map(|e| (e.t_mono, e.button_id.as_deref().unwrap_or("")))
        .collect();

    // response window is closed on both ends; premature is a half-open
    // window ending at stimulus onset; late is strictly past the deadline
    let first = presses.iter().find(|(t, _)| *t >= t0 && *t <= t1);
    let premature_count = presses
        .iter()
        .filter(|(t, _)| *t >= t0 - premature_window_s && *t < t0)
        .count();
    let late_count = presses.iter().filter(|(t, _)| *t > t1).count();

    let (first_press_t, first_press_button, rt_ms) = match first {
        Some((tp, button)) => (Some(*tp), Some(button.to_string()), Some((tp - t0) * 1000.0)),
        None => (None, None, None),
    };

    let min_rt = bounds.min_rt_ms as f64;
    let max_rt = bounds.max_rt_ms.min(timeout_ms) as f64;

    let button_matches = match rule {
        ResponseRule::MatchExpected => match (&stim_on.expected_response, &first_press_button) {
            (Some(expected), Some(button)) => expected == button,
            _ => false,
        },
        ResponseRule::GoNogo { go_button } => first_press_button.as_deref() == Some(go_button),
        ResponseRule::AnyPress => true,
    };

    let verdict = match rule {
        ResponseRule::GoNogo { .. } if stim_on.is_go != Some(true) => {
            classify_nogo(rt_ms, min_rt)
        }
        _ => classify_response_required(rt_ms, button_matches, min_rt, max_rt),
    };

    let is_valid_rt = verdict.is_correct
        && !verdict.is_anticipation
        && rt_ms.is_some_and(|rt| rt >= min_rt && rt <= max_rt);

    TrialOutcome {
        trial_id,
        block_id: stim_on.block_id.unwrap_or(1),
        stimulus_type: stim_on.stimulus_type.clone().unwrap_or_default(),
        expected_response: stim_on.expected_response.clone(),
        is_go: stim_on.is_go,
        timeout_ms,
        first_press_t,
        first_press_button,
        rt_ms,
        press_count: presses.len() as u32,
        premature_press_count: premature_count as u32,
        late_press_count: late_count as u32,
        classification: verdict.classification.unwrap_or(Classification::Unknown),
        is_correct: verdict.is_correct,
        is_valid_rt,
        is_anticipation: verdict.is_anticipation,
        is_timeout: verdict.is_timeout,
        is_wrong: verdict.is_wrong,
        is_commission: verdict.is_commission,
        is_omission: verdict.is_omission,
    }
}

/// Score a trial on which a response was required (everything except a
/// no-go trial).
///
/// An overlong response overrides whatever content classification was
/// reached: the trial becomes a timeout and correctness is revoked.
fn classify_response_required(
    rt_ms: Option<f64>,
    button_matches: bool,
    min_rt: f64,
    max_rt: f64,
) -> Verdict {
    let mut v = Verdict::default();
    match rt_ms {
        None => {
            v.classification = Some(Classification::Omission);
            v.is_omission = true;
            v.is_timeout = true;
        }
        Some(rt) => {
            if rt < min_rt {
                v.classification = Some(Classification::Anticipation);
                v.is_anticipation = true;
            } else if button_matches {
                v.classification = Some(Classification::Correct);
                v.is_correct = true;
            } else {
                v.classification = Some(Classification::Wrong);
                v.is_wrong = true;
            }
            if rt > max_rt {
                v.classification = Some(Classification::Timeout);
                v.is_timeout = true;
                v.is_correct = false;
            }
        }
    }
    v
}

/// Score a no-go trial: silence is a success, any scored response an error.
fn classify_nogo(rt_ms: Option<f64>, min_rt: f64) -> Verdict {
    let mut v = Verdict::default();
    match rt_ms {
        None => {
            v.classification = Some(Classification::CorrectInhibition);
            v.is_correct = true;
        }
        Some(rt) => {
            v.classification = Some(Classification::Commission);
            v.is_commission = true;
            if rt < min_rt {
                v.is_anticipation = true;
            }
        }
    }
    v
}
