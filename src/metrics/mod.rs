//! Path statistics shared by all selectors.
//!
//! The [`PathStatsStore`] is the only state shared across selector instances.
//! It is constructed once per process and handed to every selector as an
//! `Arc`, so tests can build isolated stores.

mod store;

pub use store::{LatencySample, PathDownEvent, PathStatsStore};

/// Capacity of the down-notification broadcast channel.
pub const DOWN_EVENT_CAPACITY: usize = 256;
