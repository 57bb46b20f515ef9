use tracing::{debug, warn};

use crate::{
    store::{Namespace, Store, StoreError, StoreExt},
    types::PositionSample,
};

use super::SampleSource;

/// Counters of a finished ingest run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Samples written to the position namespace
    pub accepted: u64,
    /// Points dropped because they could not be decoded
    pub malformed: u64,
}

/// Validate every point of the source and write the valid samples to the
/// position namespace, keyed by entity.
///
/// Malformed points are logged and skipped. Returns once the source is
/// exhausted.
pub async fn run_ingest<S>(
    mut source: Box<dyn SampleSource>,
    store: &S,
) -> Result<IngestStats, StoreError>
where
    S: Store + ?Sized,
{
    let mut stats = IngestStats::default();
    while let Some(raw) = source.next().await {
        let key = raw.key.clone();
        match PositionSample::try_from(raw) {
            Ok(sample) => {
                debug!(
                    key = sample.key(),
                    lat = sample.latitude_deg(),
                    lon = sample.longitude_deg(),
                    time = sample.event_time(),
                    "Ingested position"
                );
                store
                    .put_value(Namespace::Position, sample.key(), &sample)
                    .await?;
                stats.accepted += 1;
            }
            Err(e) => {
                warn!(key = ?key, "Dropping malformed track point: {e}");
                stats.malformed += 1;
            }
        }
    }
    Ok(stats)
}
