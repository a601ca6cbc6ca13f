//! Strategic reply selection: a fixed subset of the content-filtered order.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ContentFilter, PathSubset, ReplyCache, ReplySelector};
use crate::error::Result;
use crate::path::{Path, PathFingerprint, PathQuerier};
use crate::types::{PathInterface, UdpAddr};

/// Round-robin over chosen positions of the content-filtered paths.
///
/// The subset replaces the size limit; positions beyond the filtered list are
/// skipped.
#[derive(Debug)]
pub struct StrategicReplySelector {
    cache: ReplyCache,
    filter: ContentFilter,
    subset: PathSubset,
}

impl StrategicReplySelector {
    pub fn new(
        querier: Arc<dyn PathQuerier>,
        filter: ContentFilter,
        subset: PathSubset,
        repeats: usize,
    ) -> Self {
        Self {
            cache: ReplyCache::new(querier, None, repeats),
            filter,
            subset,
        }
    }

    pub fn subset(&self) -> &PathSubset {
        &self.subset
    }

    pub fn cache(&self) -> &ReplyCache {
        &self.cache
    }
}

#[async_trait]
impl ReplySelector for StrategicReplySelector {
    fn initialize(&self, local: UdpAddr) {
        self.cache.set_local(local);
    }

    async fn record(&self, remote: UdpAddr, hint: Option<&Path>) {
        let filter = &self.filter;
        let subset = &self.subset;
        self.cache
            .record_with(remote, hint, |paths| subset.select(&filter.apply(paths)))
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
