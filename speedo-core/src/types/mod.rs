//! Types shared across Speedo
mod observation;
mod sample;

pub use observation::SpeedObservation;
pub use sample::{MalformedSampleError, PositionSample, RawTrackPoint};

/// Event time in milliseconds since the unix epoch
pub type EventTime = i64;
