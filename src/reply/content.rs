//! Content-aware reply selection.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ContentFilter, ReplyCache, ReplySelector};
use crate::error::Result;
use crate::path::{Path, PathFingerprint, PathQuerier};
use crate::types::{PathInterface, UdpAddr};

/// Round-robin over the paths that suit a content class.
#[derive(Debug)]
pub struct ContentBasedReplySelector {
    cache: ReplyCache,
    filter: ContentFilter,
}

impl ContentBasedReplySelector {
    pub fn new(
        querier: Arc<dyn PathQuerier>,
        filter: ContentFilter,
        limit: Option<usize>,
        repeats: usize,
    ) -> Self {
        Self {
            cache: ReplyCache::new(querier, limit, repeats),
            filter,
        }
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    pub fn cache(&self) -> &ReplyCache {
        &self.cache
    }
}

#[async_trait]
impl ReplySelector for ContentBasedReplySelector {
    fn initialize(&self, local: UdpAddr) {
        self.cache.set_local(local);
    }

    async fn record(&self, remote: UdpAddr, hint: Option<&Path>) {
        let filter = &self.filter;
        self.cache
            .record_with(remote, hint, |paths| filter.apply(paths))
            .await;
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
