//! Outbound path selection.
//!
//! An outbound selector is bound to one connection and answers "which path
//! does the next packet take". Two policies are provided:
//! - [`StickySelector`]: keep the chosen path until it is reported down
//! - [`ProbedSelector`]: probe the candidates and use the fastest one
//!
//! Both consult the shared [`PathStatsStore`](crate::metrics::PathStatsStore)
//! and react to down-notifications through [`Selector::path_down`].

mod probed;
mod prober;
mod sticky;

pub use probed::ProbedSelector;
pub use prober::{ProbeOutcome, ProbeRound};
pub use sticky::StickySelector;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::metrics::{PathDownEvent, PathStatsStore};
use crate::path::{Path, PathFingerprint};
use crate::protocol::MAX_PROBE_PAYLOAD;
use crate::transport::PingerFactory;
use crate::types::{PathInterface, SelectorState, UdpAddr};

/// Default interval between probe rounds.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Default time to wait for the replies of one round.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of candidates probed per round.
pub const DEFAULT_ACTIVE_PATHS: usize = 3;

/// Default probe padding in bytes.
pub const DEFAULT_PROBE_SIZE: usize = 16;

/// Per-connection path selector.
///
/// All methods take `&self`; implementations guard their state with a single
/// mutex so the selector can be shared between the send path and the
/// down-notification watcher.
pub trait Selector: Send + Sync {
    /// Seed the candidate list and pick the initial path.
    fn initialize(&self, local: UdpAddr, remote: UdpAddr, paths: Vec<Arc<Path>>);

    /// Path for the next packet.
    fn path(&self) -> Option<Arc<Path>>;

    /// Replace the candidate list, keeping the current path if still present.
    fn refresh(&self, paths: Vec<Arc<Path>>);

    /// React to a down-notification. No-op unless the current path is affected.
    fn path_down(&self, fingerprint: PathFingerprint, interface: PathInterface);

    /// Stop background activity. Idempotent.
    fn close(&self) -> Result<()>;

    fn state(&self) -> SelectorState;

    /// Number of candidates to measure actively. Ignored by non-probing policies.
    fn set_active(&self, _num_active: usize) {}
}

/// Outbound selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Keep the path until it goes down.
    #[default]
    Sticky,
    /// Probe candidates and use the lowest latency.
    Probed,
}

/// Active probing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Interval between probe rounds.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Time to wait for the replies of one round.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Number of candidates probed per round.
    #[serde(default = "default_active_paths")]
    pub active_paths: usize,

    /// Probe padding in bytes.
    #[serde(default = "default_probe_size")]
    pub probe_size: usize,
}

fn default_interval() -> Duration { DEFAULT_PROBE_INTERVAL }
fn default_timeout() -> Duration { DEFAULT_PROBE_TIMEOUT }
fn default_active_paths() -> usize { DEFAULT_ACTIVE_PATHS }
fn default_probe_size() -> usize { DEFAULT_PROBE_SIZE }

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            active_paths: default_active_paths(),
            probe_size: default_probe_size(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("probe interval must be positive".into()));
        }
        if self.timeout.is_zero() || self.timeout >= self.interval {
            return Err(Error::InvalidConfig(format!(
                "probe timeout must be positive and below the interval ({:?} >= {:?})",
                self.timeout, self.interval
            )));
        }
        if self.probe_size > MAX_PROBE_PAYLOAD {
            return Err(Error::InvalidConfig(format!(
                "probe size {} exceeds {MAX_PROBE_PAYLOAD} bytes",
                self.probe_size
            )));
        }
        Ok(())
    }
}

/// Outbound selector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundConfig {
    #[serde(default)]
    pub policy: SelectionPolicy,

    #[serde(default)]
    pub probe: ProbeConfig,
}

impl OutboundConfig {
    /// Build a selector for one connection.
    pub fn build(
        &self,
        stats: Arc<PathStatsStore>,
        pingers: Arc<dyn PingerFactory>,
    ) -> Result<Box<dyn Selector>> {
        match self.policy {
            SelectionPolicy::Sticky => Ok(Box::new(StickySelector::new(stats))),
            SelectionPolicy::Probed => Ok(Box::new(ProbedSelector::new(
                self.probe.clone(),
                stats,
                pingers,
            )?)),
        }
    }
}

/// Forward down-notifications from `events` into `selector`.
///
/// The task ends when the channel closes or the selector is closed.
pub fn watch_path_down(
    selector: Arc<dyn Selector>,
    mut events: broadcast::Receiver<PathDownEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if selector.state() == SelectorState::Closed {
                        break;
                    }
                    selector.path_down(event.fingerprint, event.interface);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Down-notification watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::trace!("Down-notification watcher stopped");
    })
}
