//! Path query collaborator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Path;
use crate::error::{Error, Result};
use crate::types::IsdAsn;

/// Source of candidate paths, typically backed by the local path daemon.
///
/// Returned paths carry their metadata already populated. An error means "no
/// candidates right now"; callers degrade rather than fail.
#[async_trait]
pub trait PathQuerier: Send + Sync {
    async fn query_paths(&self, destination: IsdAsn) -> Result<Vec<Arc<Path>>>;
}

/// In-memory path table.
#[derive(Debug, Default)]
pub struct StaticPathQuerier {
    paths: RwLock<HashMap<IsdAsn, Vec<Arc<Path>>>>,
    queries: AtomicU64,
}

impl StaticPathQuerier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the paths announced for `destination`.
    pub fn insert(&self, destination: IsdAsn, paths: Vec<Arc<Path>>) {
        self.paths.write().insert(destination, paths);
    }

    pub fn remove(&self, destination: IsdAsn) -> Option<Vec<Arc<Path>>> {
        self.paths.write().remove(&destination)
    }

    /// Number of queries served, including failed ones.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PathQuerier for StaticPathQuerier {
    async fn query_paths(&self, destination: IsdAsn) -> Result<Vec<Arc<Path>>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        match self.paths.read().get(&destination) {
            None => Err(Error::PathQuery {
                destination,
                reason: "unknown destination".into(),
            }),
            Some(paths) if paths.is_empty() => Err(Error::NoPaths),
            Some(paths) => Ok(paths.clone()),
        }
    }
}
