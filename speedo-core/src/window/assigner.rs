use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::EventTime;

const ONE_MINUTE_MS: EventTime = 60 * 1000;
const FIVE_MINUTES_MS: EventTime = 5 * ONE_MINUTE_MS;

/// Half-open event time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Inclusive start
    pub start: EventTime,
    /// Exclusive end
    pub end: EventTime,
}

impl WindowBounds {
    /// True if the event time lies within the window
    pub fn contains(&self, time: EventTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// Invalid window definition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowConfigError {
    #[error("Window slide must be positive, got {0}ms")]
    NonPositiveSlide(EventTime),
    #[error("Window size {size}ms must not be smaller than the slide {slide}ms")]
    SizeBelowSlide { size: EventTime, slide: EventTime },
    #[error("Duration {0:?} does not fit into an event time")]
    TooLarge(Duration),
}

/// Fixed-size, overlapping event time windows of length `size` starting at
/// every multiple of `slide`.
///
/// A sample at time `t` belongs to every window `[s, s + size)` with
/// `s % slide == 0` and `s <= t < s + size`, i.e. to `ceil(size / slide)`
/// windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindows {
    size: EventTime,
    slide: EventTime,
}

impl Default for SlidingWindows {
    /// Five minute windows advancing every minute
    fn default() -> Self {
        Self {
            size: FIVE_MINUTES_MS,
            slide: ONE_MINUTE_MS,
        }
    }
}

impl SlidingWindows {
    /// Create windows of `size` advancing every `slide`
    pub fn new(size: Duration, slide: Duration) -> Result<Self, WindowConfigError> {
        let to_millis = |d: Duration| {
            EventTime::try_from(d.as_millis()).map_err(|_| WindowConfigError::TooLarge(d))
        };
        Self::from_millis(to_millis(size)?, to_millis(slide)?)
    }

    /// Create windows from a size and slide in milliseconds
    pub fn from_millis(size: EventTime, slide: EventTime) -> Result<Self, WindowConfigError> {
        if slide <= 0 {
            return Err(WindowConfigError::NonPositiveSlide(slide));
        }
        if size < slide {
            return Err(WindowConfigError::SizeBelowSlide { size, slide });
        }
        Ok(Self { size, slide })
    }

    /// Window length in milliseconds
    pub fn size(&self) -> EventTime {
        self.size
    }

    /// Distance between consecutive window starts in milliseconds
    pub fn slide(&self) -> EventTime {
        self.slide
    }

    /// Number of windows every sample is assigned to
    pub fn windows_per_sample(&self) -> usize {
        let n = self.size.saturating_add(self.slide - 1) / self.slide;
        usize::try_from(n).unwrap_or(usize::MAX)
    }

    /// Start of the slide frame containing `time`
    pub fn frame_start(&self, time: EventTime) -> EventTime {
        time - time.rem_euclid(self.slide)
    }

    /// All windows containing `time`, earliest first
    pub fn assign(&self, time: EventTime) -> Vec<WindowBounds> {
        let last_start = self.frame_start(time);
        let lower = time.saturating_sub(self.size);
        let mut windows = Vec::with_capacity(self.windows_per_sample());
        let mut start = last_start;
        while start > lower {
            windows.push(WindowBounds {
                start,
                end: start.saturating_add(self.size),
            });
            match start.checked_sub(self.slide) {
                Some(s) => start = s,
                None => break,
            }
        }
        windows.reverse();
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_is_five_minutes_by_one() {
        let windows = SlidingWindows::default();
        assert_eq!(windows.size(), 300_000);
        assert_eq!(windows.slide(), 60_000);
        assert_eq!(windows.windows_per_sample(), 5);
    }

    #[test]
    fn assigns_overlapping_windows() {
        let windows = SlidingWindows::from_millis(300, 100).unwrap();
        let assigned = windows.assign(250);
        let starts: Vec<_> = assigned.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0, 100, 200]);
        assert!(assigned.iter().all(|w| w.end == w.start + 300));
    }

    #[test]
    fn window_start_is_inclusive() {
        let windows = SlidingWindows::from_millis(300, 100).unwrap();
        let starts: Vec<_> = windows.assign(300).iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn negative_times() {
        let windows = SlidingWindows::from_millis(300, 100).unwrap();
        let starts: Vec<_> = windows.assign(-50).iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![-300, -200, -100]);
    }

    #[test]
    fn uneven_slide() {
        let windows = SlidingWindows::from_millis(250, 100).unwrap();
        assert_eq!(windows.windows_per_sample(), 3);
        assert_eq!(windows.assign(120).len(), 3);
        assert_eq!(windows.assign(180).len(), 2);
    }

    #[test]
    fn invalid_definitions() {
        assert_eq!(
            SlidingWindows::from_millis(100, 0),
            Err(WindowConfigError::NonPositiveSlide(0))
        );
        assert_eq!(
            SlidingWindows::from_millis(50, 100),
            Err(WindowConfigError::SizeBelowSlide {
                size: 50,
                slide: 100
            })
        );
        assert!(SlidingWindows::new(Duration::from_secs(300), Duration::from_secs(60)).is_ok());
    }

    proptest! {
    /// Every sample is folded into exactly size/slide windows, all of which contain it
    #[test]
    fn fan_out(time in -1_000_000_000i64..1_000_000_000, slide in 1i64..10_000, per in 1i64..10) {
        let windows = SlidingWindows::from_millis(slide * per, slide).unwrap();
        let assigned = windows.assign(time);
        prop_assert_eq!(assigned.len() as i64, per);
        for w in assigned {
            prop_assert!(w.contains(time));
            prop_assert_eq!(w.start.rem_euclid(slide), 0);
        }
    }
    }
}
