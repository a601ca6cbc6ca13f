//! Latency-driven selection backed by active probing.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{prober, ProbeConfig, Selector};
use crate::error::{Error, Result, TransportError};
use crate::metrics::PathStatsStore;
use crate::path::{Path, PathFingerprint};
use crate::transport::PingerFactory;
use crate::types::{PathInterface, ScionAddr, SelectorState, UdpAddr};

struct ProberHandle {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

#[derive(Default)]
struct ProbedState {
    lifecycle: SelectorState,
    local: Option<UdpAddr>,
    remote: Option<UdpAddr>,
    paths: Vec<Arc<Path>>,
    current: usize,
    num_active: usize,
    prober: Option<ProberHandle>,
}

impl ProbedState {
    fn remote_host(&self) -> Option<ScionAddr> {
        self.remote.map(|r| r.scion_addr())
    }
}

/// State shared between the selector and its probing task.
pub(super) struct Shared {
    pub(super) config: ProbeConfig,
    pub(super) stats: Arc<PathStatsStore>,
    state: Mutex<ProbedState>,
}

impl Shared {
    /// The candidates probed this round: the first `num_active` in order.
    pub(super) fn active_paths(&self) -> Vec<Arc<Path>> {
        let state = self.state.lock();
        if !state.lifecycle.is_active() {
            return Vec::new();
        }
        let n = state.num_active.min(state.paths.len());
        state.paths[..n].to_vec()
    }

    /// Point the selection at the lowest-latency candidate.
    pub(super) fn reselect(&self) {
        let (remote, paths) = {
            let state = self.state.lock();
            if !state.lifecycle.is_active() {
                return;
            }
            let Some(remote) = state.remote_host() else {
                return;
            };
            (remote, state.paths.clone())
        };
        let Some(best) = paths.get(self.stats.lowest_latency(remote, &paths)) else {
            return;
        };
        let best = best.fingerprint();

        let mut state = self.state.lock();
        if !state.lifecycle.is_active() {
            return;
        }
        // The list may have been refreshed meanwhile.
        let Some(index) = state.paths.iter().position(|p| p.fingerprint() == best) else {
            return;
        };
        if index != state.current {
            tracing::debug!(
                remote = %remote,
                from = state.current,
                to = index,
                "Switching to lower-latency path"
            );
            state.current = index;
        }
    }
}

/// Uses the candidate with the lowest measured latency.
///
/// Probing starts with [`Selector::set_active`] (called by `initialize` with
/// the configured count) and only between different routing domains; without
/// it the selection falls back to the first candidate not known to be down.
pub struct ProbedSelector {
    shared: Arc<Shared>,
    pingers: Arc<dyn PingerFactory>,
}

impl ProbedSelector {
    pub fn new(
        config: ProbeConfig,
        stats: Arc<PathStatsStore>,
        pingers: Arc<dyn PingerFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                stats,
                state: Mutex::new(ProbedState::default()),
            }),
            pingers,
        })
    }

    /// Whether the probing task is running.
    pub fn is_probing(&self) -> bool {
        self.shared.state.lock().prober.is_some()
    }

    /// Position of the current path in the candidate list.
    pub fn current_index(&self) -> usize {
        self.shared.state.lock().current
    }

    /// Start the probing task unless it runs already or is not wanted.
    fn ensure_probing(&self, state: &mut ProbedState) -> Result<()> {
        if state.prober.is_some() || state.num_active == 0 {
            return Ok(());
        }
        let (Some(local), Some(remote)) = (state.local, state.remote) else {
            return Ok(());
        };
        if local.ia == remote.ia {
            tracing::debug!(ia = %local.ia, "Remote in local domain, not probing");
            return Ok(());
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TransportError::NoRuntime.into());
        }

        let (pinger, replies) = self
            .pingers
            .create(local.scion_addr())
            .map_err(|e| Error::ProberSetup(e.to_string()))?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(prober::run(
            Arc::clone(&self.shared),
            remote.scion_addr(),
            pinger,
            replies,
            cancel.clone(),
        ));
        state.prober = Some(ProberHandle {
            cancel,
            _task: task,
        });
        Ok(())
    }
}

impl Selector for ProbedSelector {
    fn initialize(&self, local: UdpAddr, remote: UdpAddr, paths: Vec<Arc<Path>>) {
        let current = self.shared.stats.lowest_latency(remote.scion_addr(), &paths);
        {
            let mut state = self.shared.state.lock();
            if state.lifecycle != SelectorState::Uninitialized {
                tracing::debug!(state = %state.lifecycle, "Ignoring initialize");
                return;
            }
            state.current = current;
            state.local = Some(local);
            state.remote = Some(remote);
            state.paths = paths;
            state.lifecycle = SelectorState::Active;
            tracing::debug!(
                remote = %remote,
                paths = state.paths.len(),
                current = state.current,
                "Probed selector initialized"
            );
        }

        if self.shared.config.active_paths > 0 {
            self.set_active(self.shared.config.active_paths);
        }
    }

    fn path(&self) -> Option<Arc<Path>> {
        let state = self.shared.state.lock();
        if !state.lifecycle.is_active() {
            return None;
        }
        state.paths.get(state.current).cloned()
    }

    fn refresh(&self, paths: Vec<Arc<Path>>) {
        let (previous, remote) = {
            let state = self.shared.state.lock();
            if !state.lifecycle.is_active() {
                tracing::debug!(state = %state.lifecycle, "Ignoring refresh");
                return;
            }
            (
                state.paths.get(state.current).map(|p| p.fingerprint()),
                state.remote_host(),
            )
        };
        for path in &paths {
            self.shared.stats.clear_down(path);
        }

        let kept = previous.and_then(|fp| paths.iter().position(|p| p.fingerprint() == fp));
        let current = match (kept, remote) {
            (Some(i), _) => i,
            (None, Some(remote)) => self.shared.stats.lowest_latency(remote, &paths),
            (None, None) => 0,
        };

        let mut state = self.shared.state.lock();
        if !state.lifecycle.is_active() {
            return;
        }
        state.current = current;
        state.paths = paths;
    }

    fn path_down(&self, fingerprint: PathFingerprint, interface: PathInterface) {
        let affected = {
            let state = self.shared.state.lock();
            state.lifecycle.is_active()
                && state
                    .paths
                    .get(state.current)
                    .is_some_and(|p| p.is_affected_by(fingerprint, interface))
        };
        if affected {
            tracing::debug!(path = %fingerprint, interface = %interface, "Current path down, reselecting");
            self.shared.reselect();
        }
    }

    fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.lifecycle == SelectorState::Closed {
            return Ok(());
        }
        state.lifecycle = SelectorState::Closed;
        state.paths.clear();
        if let Some(prober) = state.prober.take() {
            prober.cancel.cancel();
        }
        tracing::debug!(remote = ?state.remote, "Probed selector closed");
        Ok(())
    }

    fn state(&self) -> SelectorState {
        self.shared.state.lock().lifecycle
    }

    fn set_active(&self, num_active: usize) {
        let mut state = self.shared.state.lock();
        if !state.lifecycle.is_active() {
            tracing::debug!(state = %state.lifecycle, "Ignoring set_active");
            return;
        }
        state.num_active = num_active;
        if let Err(e) = self.ensure_probing(&mut state) {
            tracing::warn!(remote = ?state.remote, error = %e, "Probing disabled");
        }
    }
}

impl Drop for ProbedSelector {
    fn drop(&mut self) {
        if let Some(prober) = self.shared.state.lock().prober.take() {
            prober.cancel.cancel();
        }
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for ProbedSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ProbedSelector")
            .field("state", &state.lifecycle)
            .field("paths", &state.paths.len())
            .field("current", &state.current)
            .field("probing", &state.prober.is_some())
            .finish()
    }
}
