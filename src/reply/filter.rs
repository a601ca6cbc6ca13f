//! Content-based filtering and ordering of reply paths.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::Path;

/// Default MTU floor in bytes.
pub const DEFAULT_MTU_FLOOR: u16 = 1400;

/// Default ceiling on the summed hop latency.
pub const DEFAULT_LATENCY_CEILING: Duration = Duration::from_millis(25);

/// Default bandwidth floor in Kbit/s.
pub const DEFAULT_BANDWIDTH_FLOOR: u64 = 100_000;

/// What kind of traffic the replies carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    /// Large datagrams: MTU at or above the floor, smallest sufficient MTU first.
    #[default]
    Mtu,
    /// Interactive traffic: total latency within the ceiling, fastest first.
    Latency,
    /// Bulk transfer: bottleneck bandwidth at or above the floor, widest first.
    Bandwidth,
    /// No threshold; paths whose hops are a subset of another's come first.
    HopSubset,
}

/// Content class together with its thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilter {
    #[serde(default)]
    pub class: ContentClass,

    /// Minimum MTU in bytes.
    #[serde(default = "default_mtu_floor")]
    pub mtu_floor: u16,

    /// Maximum summed hop latency.
    #[serde(default = "default_latency_ceiling", with = "humantime_serde")]
    pub latency_ceiling: Duration,

    /// Minimum per-hop bandwidth in Kbit/s.
    #[serde(default = "default_bandwidth_floor")]
    pub bandwidth_floor: u64,
}

fn default_mtu_floor() -> u16 { DEFAULT_MTU_FLOOR }
fn default_latency_ceiling() -> Duration { DEFAULT_LATENCY_CEILING }
fn default_bandwidth_floor() -> u64 { DEFAULT_BANDWIDTH_FLOOR }

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(ContentClass::default())
    }
}

impl ContentFilter {
    /// Filter for `class` with default thresholds.
    pub fn new(class: ContentClass) -> Self {
        Self {
            class,
            mtu_floor: default_mtu_floor(),
            latency_ceiling: default_latency_ceiling(),
            bandwidth_floor: default_bandwidth_floor(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.class == ContentClass::Latency && self.latency_ceiling.is_zero() {
            return Err(Error::InvalidConfig("latency ceiling must be positive".into()));
        }
        Ok(())
    }

    /// Whether `path` passes the threshold of this class.
    pub fn accepts(&self, path: &Path) -> bool {
        match self.class {
            ContentClass::Mtu => path.metadata.mtu >= self.mtu_floor,
            ContentClass::Latency => path.metadata.latency_sum().0 <= self.latency_ceiling,
            ContentClass::Bandwidth => path.metadata.bandwidth_min().0 >= self.bandwidth_floor,
            ContentClass::HopSubset => true,
        }
    }

    /// Drop paths failing the threshold and order the rest. Ordering is stable.
    pub fn apply(&self, paths: Vec<Arc<Path>>) -> Vec<Arc<Path>> {
        let mut paths: Vec<_> = paths.into_iter().filter(|p| self.accepts(p)).collect();
        match self.class {
            ContentClass::Mtu => paths.sort_by_key(|p| p.metadata.mtu),
            ContentClass::Latency => paths.sort_by_key(|p| p.metadata.latency_sum().0),
            ContentClass::Bandwidth => {
                paths.sort_by_key(|p| std::cmp::Reverse(p.metadata.bandwidth_min().0));
            }
            // A hop subset never has more hops than its superset.
            ContentClass::HopSubset => paths.sort_by_key(|p| p.hop_count()),
        }
        paths
    }
}

/// Positions of the filtered order kept by the strategic selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSubset {
    /// Explicit positions, in the given order.
    Indices(Vec<usize>),
    /// Positions `start..end`.
    Range { start: usize, end: usize },
}

impl PathSubset {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Indices(indices) if indices.is_empty() => {
                Err(Error::InvalidConfig("strategic index list is empty".into()))
            }
            Self::Range { start, end } if start >= end => Err(Error::InvalidConfig(format!(
                "strategic range {start}..{end} is empty"
            ))),
            _ => Ok(()),
        }
    }

    /// Pick the configured positions of `paths`, skipping those out of range.
    pub fn select(&self, paths: &[Arc<Path>]) -> Vec<Arc<Path>> {
        match self {
            Self::Indices(indices) => indices.iter().filter_map(|&i| paths.get(i).cloned()).collect(),
            Self::Range { start, end } => {
                let end = (*end).min(paths.len());
                paths.get(*start..end).map(<[_]>::to_vec).unwrap_or_default()
            }
        }
    }
}
