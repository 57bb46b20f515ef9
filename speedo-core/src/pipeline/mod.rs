//! The two continuous jobs and the [JobRunner](crate::control::JobRunner)
//! launching them.
//!
//! `ingest` moves raw track points from a [SampleSource] into the position
//! namespace. `speedo` windows the position changes into speeds and writes the
//! moving ones to the speed namespace.
use thiserror::Error;

use crate::{store::StoreError, window::EngineError};

mod ingest;
mod runner;
mod source;
mod speedo;

pub use ingest::{run_ingest, IngestStats};
pub use runner::{PipelineRunner, INGEST_ALIAS, INGEST_JOB, SPEEDO_JOB};
pub use source::{IterSource, ReplaySource, SampleSource, SourceFactory};
pub use speedo::{run_speedo, SpeedoStats};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
