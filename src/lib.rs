//! Client for machine learning experiments stored as Kubernetes custom
//! resources.
//!
//! An [`Experiment`] holds a job template and default parameters. Launching it
//! with [`Client::create_job`] materializes a batch job whose containers learn
//! about the experiment and their parameters through environment variables.
//! Observed values are kept in [`ExperimentResult`] (or [`Run`]) records owned
//! by the experiment.

pub mod api;
pub mod backend;
pub mod config;
pub mod tracking;

pub use api::client::{Client, Transport};
pub use api::error::{Error, RestError};
pub use api::experiment::Experiment;
pub use api::job::Job;
pub use api::record::{ExperimentResult, Run};
pub use api::resource::{Fields, Resource};
pub use api::retry::{Backoff, RetryPolicy};
pub use config::Config;
