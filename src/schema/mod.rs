//! rt.event.v1 schema
//!
//! This module defines the line-delimited event record the
//! stimulus-presentation side writes during a session and the analysis
//! pipeline consumes read-only.

mod event;

pub use event::*;
