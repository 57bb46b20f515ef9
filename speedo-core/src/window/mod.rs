//! Event time windowing of position samples.
//!
//! Samples are assigned to overlapping [SlidingWindows] per key. Each shard
//! runs a [WindowingEngine] which folds samples into partial
//! [SpeedAggregator](crate::aggregation::SpeedAggregator)s and releases them
//! as [WindowState]s once its watermark passes the window end. The
//! [ShardedEngine] runs several engines in parallel and reduces their partials
//! in a single merge step before finishing them into observations.
mod assigner;
mod engine;
mod merge;
mod sharded;
mod watermark;

pub use assigner::{SlidingWindows, WindowBounds, WindowConfigError};
pub use engine::{WindowState, WindowingEngine};
pub use merge::ShardMerge;
pub use sharded::{EngineError, EngineSettings, ShardRouting, ShardedEngine};
pub use watermark::{WatermarkPolicy, WatermarkTracker};
