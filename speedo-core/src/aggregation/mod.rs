//! Reduction of a window's position samples into a speed
mod haversine;
mod speed;

pub use haversine::{haversine_distance, EARTH_RADIUS_METRES};
pub use speed::{SpeedAggregator, SpeedError};
