//! Sticky selection with failover.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Selector;
use crate::error::Result;
use crate::metrics::PathStatsStore;
use crate::path::{Path, PathFingerprint};
use crate::types::{PathInterface, SelectorState, UdpAddr};

#[derive(Debug, Default)]
struct StickyState {
    lifecycle: SelectorState,
    remote: Option<UdpAddr>,
    paths: Vec<Arc<Path>>,
    current: usize,
}

/// Keeps using one path until it is reported down, then fails over to the
/// first candidate not known to be down.
pub struct StickySelector {
    stats: Arc<PathStatsStore>,
    state: Mutex<StickyState>,
}

impl StickySelector {
    pub fn new(stats: Arc<PathStatsStore>) -> Self {
        Self {
            stats,
            state: Mutex::new(StickyState::default()),
        }
    }

    /// Position of the current path in the candidate list.
    pub fn current_index(&self) -> usize {
        self.state.lock().current
    }
}

impl Selector for StickySelector {
    fn initialize(&self, _local: UdpAddr, remote: UdpAddr, paths: Vec<Arc<Path>>) {
        let mut state = self.state.lock();
        if state.lifecycle != SelectorState::Uninitialized {
            tracing::debug!(state = %state.lifecycle, "Ignoring initialize");
            return;
        }
        tracing::debug!(remote = %remote, paths = paths.len(), "Sticky selector initialized");
        state.remote = Some(remote);
        state.paths = paths;
        state.current = 0;
        state.lifecycle = SelectorState::Active;
    }

    fn path(&self) -> Option<Arc<Path>> {
        let state = self.state.lock();
        if !state.lifecycle.is_active() {
            return None;
        }
        state.paths.get(state.current).cloned()
    }

    fn refresh(&self, paths: Vec<Arc<Path>>) {
        if !self.state.lock().lifecycle.is_active() {
            tracing::debug!("Ignoring refresh of inactive selector");
            return;
        }
        for path in &paths {
            self.stats.clear_down(path);
        }

        let mut state = self.state.lock();
        if !state.lifecycle.is_active() {
            return;
        }
        let previous = state.paths.get(state.current).map(|p| p.fingerprint());
        state.current = previous
            .and_then(|fp| paths.iter().position(|p| p.fingerprint() == fp))
            .unwrap_or(0);
        state.paths = paths;
    }

    fn path_down(&self, fingerprint: PathFingerprint, interface: PathInterface) {
        let (remote, paths, current) = {
            let state = self.state.lock();
            if !state.lifecycle.is_active() {
                return;
            }
            let Some(current) = state.paths.get(state.current).cloned() else {
                return;
            };
            (state.remote, state.paths.clone(), current)
        };
        if !current.is_affected_by(fingerprint, interface) {
            return;
        }

        let Some(next) = self.stats.first_more_alive(&current, &paths) else {
            tracing::debug!(
                remote = ?remote,
                interface = %interface,
                "No alternative path, keeping current"
            );
            return;
        };
        let target = paths[next].fingerprint();

        let mut state = self.state.lock();
        // Apply only if nothing moved the selection meanwhile.
        let unchanged = state.lifecycle.is_active()
            && state
                .paths
                .get(state.current)
                .is_some_and(|p| p.fingerprint() == current.fingerprint());
        if !unchanged {
            return;
        }
        if let Some(index) = state.paths.iter().position(|p| p.fingerprint() == target) {
            tracing::debug!(
                remote = ?remote,
                from = %current.fingerprint(),
                to = %target,
                interface = %interface,
                "Failing over"
            );
            state.current = index;
        }
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.lifecycle = SelectorState::Closed;
        state.paths.clear();
        Ok(())
    }

    fn state(&self) -> SelectorState {
        self.state.lock().lifecycle
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for StickySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StickySelector")
            .field("state", &state.lifecycle)
            .field("paths", &state.paths.len())
            .field("current", &state.current)
            .finish()
    }
}
