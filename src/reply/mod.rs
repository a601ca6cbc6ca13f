//! Reply path selection.
//!
//! A server answering many remotes knows only the remote address when it
//! sends a reply. Reply selectors remember, per remote, the candidate paths
//! found by a path query the first time a packet from that remote was
//! recorded, and hand them out in round-robin order.
//!
//! Variants differ in how the queried paths are filtered before caching:
//! - [`RoundRobinReplySelector`]: all paths, query order
//! - [`ContentBasedReplySelector`]: paths suiting a [`ContentClass`]
//! - [`StrategicReplySelector`]: chosen positions of the content-filtered order

mod cache;
mod content;
mod filter;
mod round_robin;
mod strategic;

pub use cache::{RemoteEntry, ReplyCache};
pub use content::ContentBasedReplySelector;
pub use filter::{
    ContentClass, ContentFilter, PathSubset, DEFAULT_BANDWIDTH_FLOOR, DEFAULT_LATENCY_CEILING,
    DEFAULT_MTU_FLOOR,
};
pub use round_robin::RoundRobinReplySelector;
pub use strategic::StrategicReplySelector;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::{Path, PathFingerprint, PathQuerier};
use crate::types::{PathInterface, UdpAddr};

/// Picks reply paths keyed by remote address.
#[async_trait]
pub trait ReplySelector: Send + Sync {
    fn initialize(&self, local: UdpAddr);

    /// Note a packet from `remote` that arrived over `hint`.
    ///
    /// Without a hint nothing is recorded. A remote that already has cached
    /// paths is not queried again.
    async fn record(&self, remote: UdpAddr, hint: Option<&Path>);

    /// Path for the next reply to `remote`.
    fn path(&self, remote: UdpAddr) -> Option<Arc<Path>>;

    /// Down-notifications are currently only logged.
    fn path_down(&self, fingerprint: PathFingerprint, interface: PathInterface);

    fn close(&self) -> Result<()>;
}

// TODO: drop affected paths from cached entries once reply failover exists.
fn log_path_down(fingerprint: PathFingerprint, interface: PathInterface) {
    tracing::debug!(
        path = %fingerprint,
        interface = %interface,
        "Reply path down, no failover"
    );
}

/// Reply selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPolicy {
    #[default]
    RoundRobin,
    ContentBased,
    Strategic,
}

/// Reply selector configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default)]
    pub policy: ReplyPolicy,

    /// Maximum cached paths per remote (unlimited if unset). Ignored by the
    /// strategic policy.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Extra times each path is served before moving on.
    #[serde(default)]
    pub repeats: usize,

    #[serde(default)]
    pub content: ContentFilter,

    /// Positions kept by the strategic policy.
    #[serde(default)]
    pub subset: Option<PathSubset>,
}

impl ReplyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(Error::InvalidConfig("reply path limit must be positive".into()));
        }
        self.content.validate()?;
        match (&self.policy, &self.subset) {
            (ReplyPolicy::Strategic, None) => Err(Error::InvalidConfig(
                "strategic reply policy needs a subset".into(),
            )),
            (_, Some(subset)) => subset.validate(),
            _ => Ok(()),
        }
    }

    /// Build the configured selector.
    pub fn build(&self, querier: Arc<dyn PathQuerier>) -> Result<Arc<dyn ReplySelector>> {
        self.validate()?;
        let selector: Arc<dyn ReplySelector> = match self.policy {
            ReplyPolicy::RoundRobin => Arc::new(RoundRobinReplySelector::new(
                querier,
                self.limit,
                self.repeats,
            )),
            ReplyPolicy::ContentBased => Arc::new(ContentBasedReplySelector::new(
                querier,
                self.content.clone(),
                self.limit,
                self.repeats,
            )),
            ReplyPolicy::Strategic => {
                let subset = self.subset.clone().ok_or_else(|| {
                    Error::InvalidConfig("strategic reply policy needs a subset".into())
                })?;
                Arc::new(StrategicReplySelector::new(
                    querier,
                    self.content.clone(),
                    subset,
                    self.repeats,
                ))
            }
        };
        Ok(selector)
    }
}
