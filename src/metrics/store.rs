//! Liveness and latency table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::DOWN_EVENT_CAPACITY;
use crate::path::{is_interface_on_path, Path, PathFingerprint};
use crate::types::{PathInterface, ScionAddr};

/// Last latency observation for a (remote, path) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// Measured round-trip time, or the probe timeout if `timed_out`.
    pub rtt: Duration,
    /// The probe went unanswered; `rtt` is a penalty value.
    pub timed_out: bool,
    pub recorded_at: Instant,
}

/// A down-notification, ordered against measurements by `generation`.
#[derive(Debug, Clone, Copy)]
struct DownRecord {
    /// Interface named by the notification.
    interface: PathInterface,
    generation: u64,
}

/// Published for every down-notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathDownEvent {
    pub fingerprint: PathFingerprint,
    pub interface: PathInterface,
}

/// Process-wide path statistics.
///
/// Down-notifications and liveness proofs (measurements, explicit clears)
/// draw from one generation counter. A notification applies to a path only
/// if it is newer than the last time that path was proven alive.
pub struct PathStatsStore {
    latency: DashMap<(ScionAddr, PathFingerprint), LatencySample>,
    down: DashMap<PathFingerprint, DownRecord>,
    alive: DashMap<PathFingerprint, u64>,
    generation: AtomicU64,
    events: broadcast::Sender<PathDownEvent>,
}

impl PathStatsStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(DOWN_EVENT_CAPACITY);
        Self {
            latency: DashMap::new(),
            down: DashMap::new(),
            alive: DashMap::new(),
            generation: AtomicU64::new(0),
            events,
        }
    }

    /// Convenience constructor for the usual shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a measured round-trip time. A fresh measurement clears the down flag.
    pub fn record_latency(&self, remote: ScionAddr, fingerprint: PathFingerprint, rtt: Duration) {
        self.latency.insert(
            (remote, fingerprint),
            LatencySample {
                rtt,
                timed_out: false,
                recorded_at: Instant::now(),
            },
        );
        self.revive(fingerprint);
    }

    /// Record an unanswered probe, using `penalty` as the latency. Leaves the down flag alone.
    pub fn record_timeout(&self, remote: ScionAddr, fingerprint: PathFingerprint, penalty: Duration) {
        self.latency.insert(
            (remote, fingerprint),
            LatencySample {
                rtt: penalty,
                timed_out: true,
                recorded_at: Instant::now(),
            },
        );
    }

    /// Mark a path down because `interface` was reported unusable.
    pub fn notify_path_down(&self, fingerprint: PathFingerprint, interface: PathInterface) {
        tracing::debug!(
            fingerprint = %fingerprint,
            interface = %interface,
            "Path down notification"
        );
        self.down.insert(
            fingerprint,
            DownRecord {
                interface,
                generation: self.next_generation(),
            },
        );
        let _ = self.events.send(PathDownEvent {
            fingerprint,
            interface,
        });
    }

    /// Treat `path` as alive again, e.g. after it was handed out by a fresh
    /// path query. Returns whether it was down.
    pub fn clear_down(&self, path: &Path) -> bool {
        let was_down = self.is_down(path);
        self.revive(path.fingerprint());
        was_down
    }

    fn revive(&self, fingerprint: PathFingerprint) {
        self.alive.insert(fingerprint, self.next_generation());
        if self.down.remove(&fingerprint).is_some() {
            tracing::debug!(fingerprint = %fingerprint, "Path proven alive, clearing down flag");
        }
    }

    /// Subscribe to down-notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PathDownEvent> {
        self.events.subscribe()
    }

    pub fn latency(&self, remote: ScionAddr, fingerprint: PathFingerprint) -> Option<LatencySample> {
        self.latency.get(&(remote, fingerprint)).map(|r| *r.value())
    }

    /// Generation of the newest notification that still applies to `path`.
    fn down_generation(&self, path: &Path) -> Option<u64> {
        let fingerprint = path.fingerprint();
        let alive_since = self.alive.get(&fingerprint).map_or(0, |g| *g.value());
        self.down
            .iter()
            .filter(|r| *r.key() == fingerprint || is_interface_on_path(path, r.value().interface))
            .map(|r| r.value().generation)
            .filter(|&g| g > alive_since)
            .max()
    }

    /// Whether the path itself, or any interface on it, was reported down
    /// after the path was last proven alive.
    pub fn is_down(&self, path: &Path) -> bool {
        self.down_generation(path).is_some()
    }

    /// Failover target for `current`.
    ///
    /// The first candidate, in order, that is not down. If every other
    /// candidate is down, the one whose failure is oldest, provided it failed
    /// before `current` did; repeated notifications on the current path thus
    /// rotate through the list.
    pub fn first_more_alive(&self, current: &Path, candidates: &[Arc<Path>]) -> Option<usize> {
        let current_fp = current.fingerprint();
        let others: Vec<(usize, Option<u64>)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.fingerprint() != current_fp)
            .map(|(i, p)| (i, self.down_generation(p)))
            .collect();

        if let Some(&(i, _)) = others.iter().find(|(_, down)| down.is_none()) {
            return Some(i);
        }
        let current_down = self.down_generation(current)?;
        others
            .iter()
            .filter_map(|&(i, down)| down.map(|g| (g, i)))
            .filter(|&(g, _)| g < current_down)
            .min()
            .map(|(_, i)| i)
    }

    /// Index of the best candidate by measured latency.
    ///
    /// Paths not known to be down win over down paths, measured paths over
    /// unmeasured ones, then lower latency, then earlier position. Returns 0
    /// for an empty list.
    pub fn lowest_latency(&self, remote: ScionAddr, candidates: &[Arc<Path>]) -> usize {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| {
                let sample = self.latency(remote, p.fingerprint());
                (
                    self.is_down(p),
                    sample.is_none(),
                    sample.map_or(Duration::MAX, |s| s.rtt),
                    *i,
                )
            })
            .map_or(0, |(i, _)| i)
    }
}

impl Default for PathStatsStore {
    fn default() -> Self {
        Self::new()
    }
}

// Table contents are not useful in debug output
#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for PathStatsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathStatsStore")
            .field("latency_entries", &self.latency.len())
            .field("down", &self.down.len())
            .finish()
    }
}
