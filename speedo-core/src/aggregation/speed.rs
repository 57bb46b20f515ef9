use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::types::{EventTime, PositionSample, SpeedObservation};

use super::haversine_distance;

/// Accumulator reducing the samples of one key within one window to a speed.
///
/// Only the earliest and latest sample are kept, the count of samples
/// folded in is tracked alongside as a rough indication of accuracy.
/// Partial accumulators built on different shards can be merged with
/// [SpeedAggregator::combine] before calling [SpeedAggregator::finish].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedAggregator {
    extent: Option<Extent>,
    sample_count: usize,
}

/// Earliest and latest sample seen for a key.
/// Invariant: `first.event_time() <= last.event_time()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Extent {
    key: String,
    first: PositionSample,
    last: PositionSample,
}

/// Reasons a speed can not be computed from an accumulator
#[derive(Debug, Error, PartialEq)]
pub enum SpeedError {
    #[error("At least two samples are needed for a speed, got {0}")]
    InsufficientSamples(usize),
    #[error("First and last sample of `{key}` share the timestamp {at}")]
    ZeroElapsedTime { key: String, at: EventTime },
}

impl SpeedAggregator {
    /// Key of the samples folded in so far or `None` if empty
    pub fn key(&self) -> Option<&str> {
        self.extent.as_ref().map(|x| x.key.as_str())
    }

    /// Earliest sample by event time
    pub fn first_sample(&self) -> Option<&PositionSample> {
        self.extent.as_ref().map(|x| &x.first)
    }

    /// Latest sample by event time
    pub fn last_sample(&self) -> Option<&PositionSample> {
        self.extent.as_ref().map(|x| &x.last)
    }

    /// Number of samples folded into this accumulator, including merged partials
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Fold one sample into the accumulator.
    /// The sample replaces the first (last) sample if it is strictly earlier (later).
    pub fn accumulate(&mut self, sample: PositionSample) {
        match self.extent.as_mut() {
            None => {
                self.sample_count = 1;
                self.extent = Some(Extent {
                    key: sample.key().to_owned(),
                    first: sample.clone(),
                    last: sample,
                });
            }
            Some(extent) => {
                self.sample_count += 1;
                if sample.event_time() < extent.first.event_time() {
                    extent.first = sample.clone();
                }
                if sample.event_time() > extent.last.event_time() {
                    extent.last = sample;
                }
            }
        }
    }

    /// Merge a partial accumulator of the same key and window into this one.
    ///
    /// **NOTE:** Both the first and the last sample keep the *earlier* of the
    /// two candidates. For the last sample this differs from what
    /// [SpeedAggregator::accumulate] does.
    /// Merging stays commutative and associative.
    pub fn combine(&mut self, other: SpeedAggregator) {
        self.sample_count += other.sample_count;
        let Some(that) = other.extent else {
            return;
        };
        match self.extent.as_mut() {
            None => self.extent = Some(that),
            Some(extent) => {
                if extent.first.event_time() > that.first.event_time() {
                    extent.first = that.first;
                }
                if extent.last.event_time() > that.last.event_time() {
                    extent.last = that.last;
                }
            }
        }
    }

    /// Speed in metres per second between the first and the last sample
    pub fn speed(&self) -> Result<f64, SpeedError> {
        let extent = self
            .extent
            .as_ref()
            .filter(|_| self.sample_count > 1)
            .ok_or(SpeedError::InsufficientSamples(self.sample_count))?;
        if extent.first.same_position(&extent.last) {
            return Ok(0.0);
        }
        let elapsed_ms = extent.last.event_time() - extent.first.event_time();
        if elapsed_ms == 0 {
            return Err(SpeedError::ZeroElapsedTime {
                key: extent.key.clone(),
                at: extent.last.event_time(),
            });
        }
        let metres = haversine_distance(&extent.first, &extent.last);
        Ok(metres / (elapsed_ms as f64 / 1000.0))
    }

    /// Produce the observation for this accumulator.
    ///
    /// Accumulators with less than two samples yield a zero speed at time `0`.
    /// If first and last sample share a timestamp the error is logged and a
    /// zero speed is reported instead.
    pub fn finish(&self) -> SpeedObservation {
        let key = self.key().unwrap_or_default();
        let Some(last) = self.last_sample().filter(|_| self.sample_count > 1) else {
            return SpeedObservation::stationary(key, 0);
        };
        match self.speed() {
            Ok(metres_per_second) => SpeedObservation {
                key: key.to_owned(),
                metres_per_second,
                at_time: last.event_time(),
            },
            Err(e) => {
                error!("Falling back to zero speed: {e}");
                SpeedObservation::stationary(key, last.event_time())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use proptest::prelude::*;

    fn sample(lat: f64, lon: f64, time: EventTime) -> PositionSample {
        PositionSample::new("fuad", lat, lon, time)
    }

    fn folded(samples: impl IntoIterator<Item = PositionSample>) -> SpeedAggregator {
        let mut agg = SpeedAggregator::default();
        for s in samples {
            agg.accumulate(s);
        }
        agg
    }

    #[test]
    fn empty_aggregator() {
        let agg = SpeedAggregator::default();
        assert_eq!(agg.key(), None);
        assert_eq!(agg.sample_count(), 0);
        assert_eq!(agg.finish(), SpeedObservation::stationary("", 0));
    }

    #[test]
    fn single_sample_has_no_speed() {
        let agg = folded([sample(0.0, 0.0, 1000)]);
        assert_eq!(agg.sample_count(), 1);
        assert_eq!(agg.speed(), Err(SpeedError::InsufficientSamples(1)));
        let obs = agg.finish();
        assert_eq!(obs.metres_per_second, 0.0);
        assert_eq!(obs.at_time, 0);
        assert_eq!(obs.key, "fuad");
    }

    #[test]
    fn no_movement_is_zero_speed() {
        let agg = folded([sample(1.0, 2.0, 0), sample(1.0, 2.0, 60_000)]);
        let obs = agg.finish();
        assert_eq!(obs.metres_per_second, 0.0);
        assert_eq!(obs.at_time, 60_000);
    }

    /// 0.01 degrees east along the equator in one minute
    #[test]
    fn known_distance_speed() {
        let agg = folded([sample(0.0, 0.0, 0), sample(0.0, 0.01, 60_000)]);
        let obs = agg.finish();
        assert!((obs.metres_per_second - 1111.949 / 60.0).abs() < 1e-3);
        assert!((obs.metres_per_second - 18.55).abs() < 0.05);
        assert_eq!(obs.at_time, 60_000);
    }

    #[test]
    fn intermediate_samples_only_count() {
        let agg = folded([
            sample(0.0, 0.0, 0),
            sample(5.0, 5.0, 30_000),
            sample(0.0, 0.01, 60_000),
        ]);
        assert_eq!(agg.sample_count(), 3);
        assert!((agg.finish().metres_per_second - 1111.949 / 60.0).abs() < 1e-3);
    }

    #[test]
    fn equal_timestamps_keep_the_first_sample() {
        let agg = folded([sample(0.0, 0.0, 5000), sample(0.0, 0.01, 5000)]);
        assert_eq!(agg.sample_count(), 2);
        assert_eq!(agg.first_sample(), agg.last_sample());
        assert_eq!(agg.speed(), Ok(0.0));
    }

    #[test]
    fn zero_elapsed_time_falls_back_to_zero() {
        let mut b = folded([sample(0.0, 0.02, 5000), sample(0.0, 0.03, 9000)]);
        let a = folded([sample(0.0, 0.01, 5000)]);
        b.combine(a);
        assert_eq!(
            b.speed(),
            Err(SpeedError::ZeroElapsedTime {
                key: "fuad".into(),
                at: 5000
            })
        );
        assert_eq!(b.finish(), SpeedObservation::stationary("fuad", 5000));
    }

    #[test]
    fn out_of_order_samples() {
        let agg = folded([
            sample(0.0, 0.02, 120_000),
            sample(0.0, 0.0, 0),
            sample(0.0, 0.01, 60_000),
        ]);
        assert_eq!(agg.first_sample().unwrap().event_time(), 0);
        assert_eq!(agg.last_sample().unwrap().event_time(), 120_000);
    }

    #[test]
    fn combine_with_empty() {
        let full = folded([sample(0.0, 0.0, 0), sample(0.0, 0.01, 60_000)]);

        let mut left = SpeedAggregator::default();
        left.combine(full.clone());
        assert_eq!(left, full);

        let mut right = full.clone();
        right.combine(SpeedAggregator::default());
        assert_eq!(right, full);
    }

    /// Merging keeps the earlier of both last samples, unlike `accumulate`
    /// which keeps the later one
    #[test]
    fn combine_keeps_earlier_last_sample() {
        let mut a = folded([sample(0.0, 0.0, 0), sample(0.0, 0.01, 60_000)]);
        let b = folded([sample(0.0, 0.02, 90_000), sample(0.0, 0.03, 120_000)]);
        a.combine(b);
        assert_eq!(a.sample_count(), 4);
        assert_eq!(a.first_sample().unwrap().event_time(), 0);
        assert_eq!(a.last_sample().unwrap().event_time(), 60_000);
    }

    /// On equal timestamps the receiving side keeps its own sample, so
    /// merging is only order independent for distinct timestamps
    #[test]
    fn combine_ties_keep_own_sample() {
        let a = folded([sample(0.0, 0.01, 5000)]);
        let b = folded([sample(0.0, 0.02, 5000), sample(0.0, 0.03, 9000)]);

        let mut ab = a.clone();
        ab.combine(b.clone());
        assert_eq!(ab.first_sample().unwrap().longitude_deg(), 0.01);
        assert_eq!(ab.last_sample().unwrap().longitude_deg(), 0.01);
        assert_eq!(ab.speed(), Ok(0.0));

        let mut ba = b;
        ba.combine(a);
        assert_eq!(ba.first_sample().unwrap().longitude_deg(), 0.02);
        assert_eq!(ba.last_sample().unwrap().longitude_deg(), 0.01);
        assert_ne!(ab, ba);
    }

    fn samples_strategy() -> impl Strategy<Value = Vec<PositionSample>> {
        // distinct timestamps, ties would make first/last depend on arrival order
        prop::collection::btree_set(0i64..1_000_000, 1..20).prop_flat_map(|times| {
            let n = times.len();
            prop::collection::vec((-80.0f64..80.0, -170.0f64..170.0), n).prop_map(
                move |coords| {
                    times
                        .iter()
                        .zip(coords)
                        .map(|(t, (lat, lon))| sample(lat, lon, *t))
                        .collect_vec()
                },
            )
        })
    }

    proptest! {
    /// Folding order does not change the result
    #[test]
    fn accumulate_order_independent(samples in samples_strategy(), seed in any::<u64>()) {
        use rand::{seq::SliceRandom, SeedableRng};
        let mut shuffled = samples.clone();
        shuffled.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));
        prop_assert_eq!(folded(samples), folded(shuffled));
    }

    #[test]
    fn combine_commutative_associative(
        samples in samples_strategy(),
        cut_a in any::<prop::sample::Index>(),
        cut_b in any::<prop::sample::Index>()
    ) {
        let (i, j) = {
            let x = cut_a.index(samples.len() + 1);
            let y = cut_b.index(samples.len() + 1);
            (x.min(y), x.max(y))
        };
        let a = folded(samples[..i].to_vec());
        let b = folded(samples[i..j].to_vec());
        let c = folded(samples[j..].to_vec());

        let mut ab = a.clone();
        ab.combine(b.clone());
        let mut ba = b.clone();
        ba.combine(a.clone());
        prop_assert_eq!(&ab, &ba);

        let mut ab_c = ab;
        ab_c.combine(c.clone());
        let mut bc = b;
        bc.combine(c);
        let mut a_bc = a;
        a_bc.combine(bc);
        prop_assert_eq!(&ab_c, &a_bc);
        prop_assert_eq!(ab_c.sample_count(), samples.len());
    }
    }
}
