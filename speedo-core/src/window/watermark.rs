use crate::types::EventTime;

use super::SlidingWindows;

/// Decides how far event time has progressed given the event times observed.
///
/// A watermark `w` states that no samples with an event time below `w` are
/// expected anymore, so every window ending at or before `w` may be closed.
/// The watermark trails the largest event time observed by `allowed_lag`,
/// with the default of zero lag it tracks that maximum directly.
///
/// When emitting by frame, watermarks are rounded down to the start of the
/// current slide frame. Window ends are frame aligned, so this closes the same
/// windows but never treats samples of the current frame as late.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatermarkPolicy {
    allowed_lag: EventTime,
    frame: Option<EventTime>,
}

impl WatermarkPolicy {
    /// Watermark trailing the maximum observed event time by `lag` milliseconds.
    /// Negative lags are treated as zero.
    pub fn with_fixed_lag(lag: EventTime) -> Self {
        Self {
            allowed_lag: lag.max(0),
            frame: None,
        }
    }

    /// Only emit watermarks at the slide boundaries of `windows`
    pub fn emit_by_frame(mut self, windows: &SlidingWindows) -> Self {
        self.frame = Some(windows.slide());
        self
    }

    /// Allowed out-of-orderness in milliseconds
    pub fn allowed_lag(&self) -> EventTime {
        self.allowed_lag
    }

    /// Watermark implied by the largest event time observed
    pub fn watermark_for(&self, max_seen: EventTime) -> EventTime {
        let wm = max_seen.saturating_sub(self.allowed_lag);
        match self.frame {
            Some(frame) => wm - wm.rem_euclid(frame),
            None => wm,
        }
    }

    /// Create a fresh tracker following this policy
    pub fn tracker(&self) -> WatermarkTracker {
        WatermarkTracker {
            policy: *self,
            max_seen: None,
            current: None,
        }
    }
}

/// Tracks the watermark of one shard. Watermarks never move backwards.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    policy: WatermarkPolicy,
    max_seen: Option<EventTime>,
    current: Option<EventTime>,
}

impl WatermarkTracker {
    /// Observe an event time, returning the new watermark if it advanced
    pub fn observe(&mut self, time: EventTime) -> Option<EventTime> {
        let max_seen = self.max_seen.map_or(time, |m| m.max(time));
        self.max_seen = Some(max_seen);
        let candidate = self.policy.watermark_for(max_seen);
        if self.current.is_none_or(|c| candidate > c) {
            self.current = Some(candidate);
            Some(candidate)
        } else {
            None
        }
    }

    /// Current watermark or `None` if nothing was observed yet
    pub fn current(&self) -> Option<EventTime> {
        self.current
    }

    /// True if a window ending at `end` can no longer receive samples
    pub fn is_closed(&self, end: EventTime) -> bool {
        self.current.is_some_and(|wm| end <= wm)
    }

    /// Advance to the end of time, closing every window.
    /// Used when the input is finished.
    pub fn finish(&mut self) -> EventTime {
        self.current = Some(EventTime::MAX);
        EventTime::MAX
    }
}
