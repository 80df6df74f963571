//! Reflex - offline compute engine for reaction-time experiment analysis
//!
//! Reflex turns the raw event log written during a reaction-time session into
//! a structured performance summary through a deterministic pipeline:
//! event parsing → trial reconstruction → metric aggregation → state flagging.
//!
//! ## Modules
//!
//! - **schema**: the `rt.event.v1` line-delimited event record
//! - **trial**: per-trial reconstruction and task-specific classification
//! - **metrics**: session-level psychometric aggregates
//! - **flags**: heuristic behavioral-state flags
//! - **session**: orchestration and summary persistence

pub mod config;
pub mod error;
pub mod flags;
pub mod metrics;
pub mod schema;
pub mod session;
pub mod sink;
pub mod stats;
pub mod trial;

pub use config::ProjectConfig;
pub use error::AnalysisError;
pub use session::{analyze_events, analyze_log, SessionAnalysis, SessionSummary};
pub use trial::{Classification, TaskKind, TrialOutcome};

/// Reflex version embedded in every session summary
pub const REFLEX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for session summaries
pub const PRODUCER_NAME: &str = "reflex";
