//! Static path metadata as reported by the path query.

use std::time::Duration;

/// Metadata attached to a path.
///
/// Per-hop vectors may contain gaps (`None`) where the control plane did not
/// announce a value; aggregate helpers report whether the value was complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMetadata {
    /// Path MTU in bytes.
    pub mtu: u16,
    /// Announced latency per hop.
    pub latency: Vec<Option<Duration>>,
    /// Announced bandwidth per hop, in Kbit/s.
    pub bandwidth: Vec<Option<u64>>,
}

impl PathMetadata {
    pub fn new(mtu: u16) -> Self {
        Self {
            mtu,
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Vec<Option<Duration>>) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth: Vec<Option<u64>>) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Sum of the known hop latencies, and whether every hop was known.
    pub fn latency_sum(&self) -> (Duration, bool) {
        let sum: Duration = self.latency.iter().flatten().sum();
        let complete = self.latency.iter().all(Option::is_some);
        (sum, complete)
    }

    /// Smallest known hop bandwidth (0 if none is known), and whether every hop was known.
    pub fn bandwidth_min(&self) -> (u64, bool) {
        let min = self.bandwidth.iter().flatten().copied().min().unwrap_or(0);
        let complete = self.bandwidth.iter().all(Option::is_some);
        (min, complete)
    }

    /// `(self has lower latency, comparison is exact)`.
    pub fn lower_latency(&self, other: &Self) -> (bool, bool) {
        let (ours, ours_complete) = self.latency_sum();
        let (theirs, theirs_complete) = other.latency_sum();
        (ours < theirs, ours_complete && theirs_complete)
    }

    /// `(self has higher bandwidth, comparison is exact)`.
    pub fn higher_bandwidth(&self, other: &Self) -> (bool, bool) {
        let (ours, ours_complete) = self.bandwidth_min();
        let (theirs, theirs_complete) = other.bandwidth_min();
        (ours > theirs, ours_complete && theirs_complete)
    }
}
