//! Helpers for code running inside an experiment job.

mod context;
mod run;

pub use context::JobContext;
pub use run::TrackingRun;
