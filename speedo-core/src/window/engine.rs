use indexmap::IndexMap;
use itertools::Itertools;
use tracing::debug;

use crate::{
    aggregation::SpeedAggregator,
    types::{EventTime, PositionSample, SpeedObservation},
};

use super::{SlidingWindows, WatermarkPolicy, WatermarkTracker, WindowBounds};

/// Partial aggregate of one key within one window.
///
/// Exists from the first sample of the key in the window until the window is
/// closed by the watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    /// Entity key
    pub key: String,
    /// Window the aggregate covers
    pub window: WindowBounds,
    /// Samples folded in so far
    pub aggregator: SpeedAggregator,
}

impl WindowState {
    /// Compute the observation for this window
    pub fn finish(&self) -> SpeedObservation {
        self.aggregator.finish()
    }
}

/// Assigns the samples of one shard to sliding windows per key and closes
/// windows as the shard's watermark advances.
#[derive(Debug)]
pub struct WindowingEngine {
    windows: SlidingWindows,
    watermark: WatermarkTracker,
    open: IndexMap<(String, WindowBounds), SpeedAggregator>,
    late_samples: u64,
}

impl WindowingEngine {
    /// Create an engine without any open windows
    pub fn new(windows: SlidingWindows, policy: WatermarkPolicy) -> Self {
        Self {
            windows,
            watermark: policy.tracker(),
            open: IndexMap::new(),
            late_samples: 0,
        }
    }

    /// Fold a sample into every window it belongs to which is still open and
    /// return the windows closed by the resulting watermark advance.
    ///
    /// If all of the sample's windows are already closed the sample is
    /// dropped as late.
    pub fn ingest(&mut self, sample: PositionSample) -> Vec<WindowState> {
        let time = sample.event_time();
        let mut folded = 0usize;
        for window in self.windows.assign(time) {
            if self.watermark.is_closed(window.end) {
                continue;
            }
            self.open
                .entry((sample.key().to_owned(), window))
                .or_default()
                .accumulate(sample.clone());
            folded += 1;
        }
        if folded == 0 {
            self.late_samples += 1;
            debug!(
                key = sample.key(),
                time,
                watermark = self.watermark.current(),
                "Dropping late sample"
            );
        }

        match self.watermark.observe(time) {
            Some(wm) => self.close_until(wm),
            None => Vec::new(),
        }
    }

    /// Close all remaining windows, e.g. because the input is finished
    pub fn finish(&mut self) -> Vec<WindowState> {
        let wm = self.watermark.finish();
        self.close_until(wm)
    }

    /// Current watermark of this engine
    pub fn watermark(&self) -> Option<EventTime> {
        self.watermark.current()
    }

    /// Number of (key, window) pairs currently open
    pub fn open_windows(&self) -> usize {
        self.open.len()
    }

    /// Number of samples dropped because all their windows were closed
    pub fn late_samples(&self) -> u64 {
        self.late_samples
    }

    /// Remove and return every window ending at or before the watermark,
    /// ordered by window and key
    fn close_until(&mut self, watermark: EventTime) -> Vec<WindowState> {
        let (closed, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open)
            .into_iter()
            .partition(|((_, window), _)| window.end <= watermark);
        self.open = open.into_iter().collect();
        closed
            .into_iter()
            .map(|((key, window), aggregator)| WindowState {
                key,
                window,
                aggregator,
            })
            .sorted_by(|a, b| (a.window, &a.key).cmp(&(b.window, &b.key)))
            .collect()
    }
}
