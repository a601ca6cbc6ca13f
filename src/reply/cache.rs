//! Per-remote path cache shared by the reply selectors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::path::{Path, PathQuerier};
use crate::types::UdpAddr;

/// Cached paths of one remote.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Filtered and ordered candidates.
    pub paths: Vec<Arc<Path>>,
    /// Last time a packet from this remote was recorded.
    pub seen: Instant,
    index: usize,
    served: usize,
}

impl RemoteEntry {
    fn new(paths: Vec<Arc<Path>>) -> Self {
        Self {
            paths,
            seen: Instant::now(),
            index: 0,
            served: 0,
        }
    }

    /// Next path in round-robin order, serving each one `repeats + 1` times.
    fn advance(&mut self, repeats: usize) -> Option<Arc<Path>> {
        if self.paths.is_empty() {
            return None;
        }
        let path = Arc::clone(&self.paths[self.index % self.paths.len()]);
        self.served += 1;
        if self.served > repeats {
            self.served = 0;
            self.index = (self.index + 1) % self.paths.len();
        }
        Some(path)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    local: Option<UdpAddr>,
    closed: bool,
    remotes: HashMap<UdpAddr, RemoteEntry>,
}

/// Remote-to-paths map populated from path queries.
///
/// Entries are filled once and never refreshed.
pub struct ReplyCache {
    querier: Arc<dyn PathQuerier>,
    limit: Option<usize>,
    repeats: usize,
    state: Mutex<CacheState>,
}

impl ReplyCache {
    pub fn new(querier: Arc<dyn PathQuerier>, limit: Option<usize>, repeats: usize) -> Self {
        Self {
            querier,
            limit,
            repeats,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn set_local(&self, local: UdpAddr) {
        self.state.lock().local = Some(local);
    }

    pub fn local(&self) -> Option<UdpAddr> {
        self.state.lock().local
    }

    /// Populate the entry for `remote` unless it already has paths.
    ///
    /// `prepare` filters and orders the queried paths before the size limit
    /// is applied. The lock is not held across the query; if another caller
    /// filled the entry meanwhile, this result is discarded.
    pub async fn record_with<F>(&self, remote: UdpAddr, hint: Option<&Path>, prepare: F)
    where
        F: FnOnce(Vec<Arc<Path>>) -> Vec<Arc<Path>> + Send,
    {
        if hint.is_none() {
            return;
        }

        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            if let Some(entry) = state.remotes.get_mut(&remote) {
                entry.seen = Instant::now();
                if !entry.paths.is_empty() {
                    return;
                }
            }
        }

        let queried = match self.querier.query_paths(remote.ia).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(remote = %remote, error = %e, "Path query for reply failed");
                return;
            }
        };

        let mut paths = prepare(queried);
        if let Some(limit) = self.limit {
            paths.truncate(limit);
        }

        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let populated = state
            .remotes
            .get(&remote)
            .is_some_and(|e| !e.paths.is_empty());
        if populated {
            tracing::trace!(remote = %remote, "Reply paths already cached, discarding query result");
        } else {
            tracing::debug!(remote = %remote, paths = paths.len(), "Cached reply paths");
            state.remotes.insert(remote, RemoteEntry::new(paths));
        }
    }

    /// Next cached path for `remote`, advancing its cursor.
    pub fn next_path(&self, remote: UdpAddr) -> Option<Arc<Path>> {
        let repeats = self.repeats;
        self.state.lock().remotes.get_mut(&remote)?.advance(repeats)
    }

    /// Snapshot of the cached candidates of `remote`.
    pub fn cached_paths(&self, remote: UdpAddr) -> Option<Vec<Arc<Path>>> {
        self.state.lock().remotes.get(&remote).map(|e| e.paths.clone())
    }

    /// When `remote` was last recorded.
    pub fn last_seen(&self, remote: UdpAddr) -> Option<Instant> {
        self.state.lock().remotes.get(&remote).map(|e| e.seen)
    }

    /// Number of remotes with an entry.
    pub fn len(&self) -> usize {
        self.state.lock().remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and stop accepting new ones.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.remotes.clear();
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for ReplyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyCache")
            .field("limit", &self.limit)
            .field("repeats", &self.repeats)
            .field("remotes", &self.len())
            .finish()
    }
}
