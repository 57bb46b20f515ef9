use serde::{Deserialize, Serialize};

use super::EventTime;

/// Instantaneous speed of one entity, emitted once per closed window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedObservation {
    /// Entity the speed was observed for
    pub key: String,
    /// Speed over the window. Zero for windows with less than two samples or no movement
    pub metres_per_second: f64,
    /// Event time of the latest sample in the window, `0` if the speed is undefined
    pub at_time: EventTime,
}

impl SpeedObservation {
    /// An observation of an entity not moving or without enough data to tell
    pub fn stationary(key: impl Into<String>, at_time: EventTime) -> Self {
        Self {
            key: key.into(),
            metres_per_second: 0.0,
            at_time,
        }
    }

    /// True if the observation reports actual movement.
    /// Stationary observations are filtered before they reach the store.
    pub fn is_moving(&self) -> bool {
        self.metres_per_second > 0.0
    }
}
