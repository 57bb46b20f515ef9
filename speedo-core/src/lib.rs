//! Speedo derives per-entity speeds from a stream of geolocation samples and
//! controls the continuous jobs doing so across a cluster of control nodes.
pub mod aggregation;
pub mod config;
pub mod control;
pub mod partitioners;
pub mod pipeline;
pub mod store;
pub mod types;
pub mod window;
