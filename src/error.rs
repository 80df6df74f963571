//! Error types for Reflex

use thiserror::Error;

/// Errors that can abort a session analysis
///
/// Only two situations are fatal for a whole session: a log line that does
/// not parse as an event record, and a configuration file that cannot be
/// loaded. Everything else degrades to an absent field in the summary.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("malformed event at line {line}: {source}")]
    MalformedEvent {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("failed to load configuration: {0}")]
    ConfigError(String),

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
