use std::fmt::Display;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{store::StoreError, window::EngineError};

/// Random identity of one launched job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Opaque handle of a running job.
///
/// Only used for identity and logging, it can not cancel the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: JobId,
    target: String,
}

impl JobHandle {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            id: JobId::random(),
            target: target.into(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("No pipeline named `{0}`")]
    UnknownPipeline(String),
    #[error("Invalid arguments for `{target}`: {reason}")]
    InvalidArgs { target: String, reason: String },
    #[error("Error opening sample source: {0}")]
    Source(#[from] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds and launches the pipeline of a job.
///
/// A launched job can not be terminated through this trait.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn launch(&self, target: &str, args: Option<&str>) -> Result<JobHandle, LaunchError>;
}
