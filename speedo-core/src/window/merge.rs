use indexmap::IndexMap;
use itertools::Itertools;
use tracing::warn;

use crate::{
    aggregation::SpeedAggregator,
    types::{EventTime, SpeedObservation},
};

use super::{WindowBounds, WindowState};

/// Final reduction step combining shard-local partial aggregates into one per
/// (key, window) before finishing them.
///
/// The merge has a single owner, all shards hand their partials and
/// watermarks to it through a channel.
///
/// If keys are routed to shards by key, a partial is complete as soon as it
/// arrives and is finished immediately. Otherwise a window is finished once
/// every shard's watermark has advanced past its end. A shard which never
/// reports a watermark holds back all windows until the input is finished.
#[derive(Debug)]
pub struct ShardMerge {
    key_affine: bool,
    watermarks: Vec<Option<EventTime>>,
    pending: IndexMap<(String, WindowBounds), SpeedAggregator>,
    released: Option<EventTime>,
}

impl ShardMerge {
    /// Create a merge step for `shards` shards
    pub fn new(shards: usize, key_affine: bool) -> Self {
        Self {
            key_affine,
            watermarks: vec![None; shards],
            pending: IndexMap::new(),
            released: None,
        }
    }

    /// Accept a partial closed by one shard, returning any observations which
    /// are complete now
    pub fn offer(&mut self, partial: WindowState) -> Vec<SpeedObservation> {
        if self.key_affine {
            return vec![partial.finish()];
        }
        if self.released.is_some_and(|r| partial.window.end <= r) {
            warn!(
                key = %partial.key,
                start = partial.window.start,
                end = partial.window.end,
                "Dropping partial for already finished window"
            );
            return Vec::new();
        }
        self.pending
            .entry((partial.key, partial.window))
            .or_default()
            .combine(partial.aggregator);
        self.release()
    }

    /// Record a shard's watermark, returning observations completed by it
    pub fn advance(&mut self, shard: usize, watermark: EventTime) -> Vec<SpeedObservation> {
        match self.watermarks.get_mut(shard) {
            Some(slot) => {
                if slot.is_none_or(|prev| watermark > prev) {
                    *slot = Some(watermark);
                }
            }
            None => {
                warn!(shard, "Watermark from unknown shard");
                return Vec::new();
            }
        }
        if self.key_affine {
            return Vec::new();
        }
        self.release()
    }

    /// Lowest watermark of all shards, `None` until every shard reported one
    pub fn watermark(&self) -> Option<EventTime> {
        self.watermarks
            .iter()
            .copied()
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min()
    }

    /// Number of (key, window) pairs waiting for slower shards
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn release(&mut self) -> Vec<SpeedObservation> {
        let Some(wm) = self.watermark() else {
            return Vec::new();
        };
        self.released = Some(self.released.map_or(wm, |r| r.max(wm)));
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|((_, window), _)| window.end <= wm);
        self.pending = waiting.into_iter().collect();
        done.into_iter()
            .sorted_by(|a, b| (a.0 .1, &a.0 .0).cmp(&(b.0 .1, &b.0 .0)))
            .map(|(_, aggregator)| aggregator.finish())
            .collect()
    }
}
