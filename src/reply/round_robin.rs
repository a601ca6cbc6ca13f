//! Round-robin reply selection.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ReplyCache, ReplySelector};
use crate::error::Result;
use crate::path::{Path, PathFingerprint, PathQuerier};
use crate::types::{PathInterface, UdpAddr};

/// Cycles through every path to the remote, in query order.
#[derive(Debug)]
pub struct RoundRobinReplySelector {
    cache: ReplyCache,
}

impl RoundRobinReplySelector {
    pub fn new(querier: Arc<dyn PathQuerier>, limit: Option<usize>, repeats: usize) -> Self {
        Self {
            cache: ReplyCache::new(querier, limit, repeats),
        }
    }

    pub fn cache(&self) -> &ReplyCache {
        &self.cache
    }
}

#[async_trait]
impl ReplySelector for RoundRobinReplySelector {
    fn initialize(&self, local: UdpAddr) {
        self.cache.set_local(local);
    }

    async fn record(&self, remote: UdpAddr, hint: Option<&Path>) {
        self.cache.record_with(remote, hint, |paths| paths).await;
    }

    fn path(&self, remote: UdpAddr) -> Option<Arc<Path>> {
        self.cache.next_path(remote)
    }

    fn path_down(&self, fingerprint: PathFingerprint, interface: PathInterface) {
        super::log_path_down(fingerprint, interface);
    }

    fn close(&self) -> Result<()> {
        self.cache.close();
        Ok(())
    }
}
