use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::{
    control::{JobHandle, JobRegistry, JobRunner, LaunchError},
    store::{Namespace, Store},
    window::{EngineSettings, ShardedEngine},
};

use super::{run_ingest, run_speedo, SourceFactory};

/// Job moving raw track points into the position namespace
pub const INGEST_JOB: &str = "ingest";
/// Other accepted name of [INGEST_JOB]
pub const INGEST_ALIAS: &str = "kafka";
/// Job computing speeds from positions
pub const SPEEDO_JOB: &str = "speedo";

/// Launches the `ingest` and `speedo` jobs as tasks on the current runtime
pub struct PipelineRunner<S: ?Sized> {
    store: Arc<S>,
    sources: Arc<dyn SourceFactory>,
    engine: EngineSettings,
}

impl<S> PipelineRunner<S>
where
    S: Store + ?Sized,
{
    pub fn new(store: Arc<S>, sources: Arc<dyn SourceFactory>, engine: EngineSettings) -> Self {
        Self {
            store,
            sources,
            engine,
        }
    }

    /// Registry of all jobs this runner can launch
    pub fn registry() -> JobRegistry {
        JobRegistry::new([INGEST_JOB, SPEEDO_JOB]).with_alias(INGEST_ALIAS, INGEST_JOB)
    }

    async fn launch_ingest(
        &self,
        handle: &JobHandle,
        args: Option<&str>,
    ) -> Result<(), LaunchError> {
        let source = self.sources.build(args).await?;
        let store = self.store.clone();
        let id = handle.id();
        tokio::spawn(async move {
            match run_ingest(source, store.as_ref()).await {
                Ok(stats) => info!(
                    %id,
                    accepted = stats.accepted,
                    malformed = stats.malformed,
                    "Ingest source exhausted"
                ),
                Err(e) => error!(%id, "Ingest failed: {e}"),
            }
        });
        Ok(())
    }

    async fn launch_speedo(
        &self,
        handle: &JobHandle,
        args: Option<&str>,
    ) -> Result<(), LaunchError> {
        if let Some(args) = args {
            debug!(args, "Speedo job takes no arguments, ignoring them");
        }
        // subscribe before returning so no position written after START is missed
        let positions = self.store.subscribe(Namespace::Position).await?;
        let (tx, rx) = flume::bounded(self.engine.channel_capacity());
        let engine = ShardedEngine::spawn(&self.engine, tx)?;
        let store = self.store.clone();
        let id = handle.id();
        tokio::spawn(async move {
            match run_speedo(positions, store, engine, rx).await {
                Ok(stats) => info!(
                    %id,
                    samples = stats.samples,
                    speeds = stats.speeds,
                    "Speedo job finished"
                ),
                Err(e) => error!(%id, "Speedo job failed: {e}"),
            }
        });
        Ok(())
    }
}

#[async_trait]
impl<S> JobRunner for PipelineRunner<S>
where
    S: Store + ?Sized,
{
    async fn launch(&self, target: &str, args: Option<&str>) -> Result<JobHandle, LaunchError> {
        let handle = JobHandle::new(target);
        match target {
            INGEST_JOB => self.launch_ingest(&handle, args).await?,
            SPEEDO_JOB => self.launch_speedo(&handle, args).await?,
            other => return Err(LaunchError::UnknownPipeline(other.to_owned())),
        }
        info!(job = target, id = %handle.id(), "Launched pipeline");
        Ok(handle)
    }
}
