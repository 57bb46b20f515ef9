use tracing::{info, warn};

use crate::{
    store::{Namespace, Store, StoreError, StoreExt, Subscription},
    types::{PositionSample, SpeedObservation},
    window::ShardedEngine,
};

use super::PipelineError;

/// Counters of a finished speedo run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeedoStats {
    /// Position changes fed into the engine
    pub samples: u64,
    /// Moving observations written to the speed namespace
    pub speeds: u64,
}

/// Feed every position change into `engine` and write the moving
/// observations it emits on `observations` to the speed namespace.
///
/// Runs until the position subscription ends, then flushes the engine.
pub async fn run_speedo<S>(
    positions: Subscription,
    store: std::sync::Arc<S>,
    mut engine: ShardedEngine,
    observations: flume::Receiver<SpeedObservation>,
) -> Result<SpeedoStats, PipelineError>
where
    S: Store + ?Sized,
{
    let sink = tokio::spawn(write_speeds(observations, store));

    let mut samples = 0;
    while let Some(event) = positions.next().await {
        let sample: PositionSample = match event.decode() {
            Ok(x) => x,
            Err(e) => {
                warn!(key = %event.key, "Skipping undecodable position: {e}");
                continue;
            }
        };
        engine.ingest_async(sample).await?;
        samples += 1;
    }

    tokio::task::spawn_blocking(move || engine.finish()).await??;
    let speeds = sink.await??;
    Ok(SpeedoStats { samples, speeds })
}

/// Drop stationary observations and store the others
async fn write_speeds<S>(
    observations: flume::Receiver<SpeedObservation>,
    store: std::sync::Arc<S>,
) -> Result<u64, StoreError>
where
    S: Store + ?Sized,
{
    let mut written = 0;
    while let Ok(observation) = observations.recv_async().await {
        if !observation.is_moving() {
            continue;
        }
        info!(
            key = %observation.key,
            metres_per_second = observation.metres_per_second,
            at = observation.at_time,
            "Speed"
        );
        store
            .put_value(Namespace::Speed, &observation.key, &observation)
            .await?;
        written += 1;
    }
    Ok(written)
}
