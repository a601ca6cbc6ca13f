//! # pathsel
//!
//! Multipath path selection for path-aware transports.
//!
//! Given the candidate paths to a remote endpoint, pathsel decides which path
//! the next packet (or the next reply) takes. Selection incorporates liveness
//! feedback from down-notifications, latency measured by active probing, and
//! static path metadata such as MTU and bandwidth.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Transport (external)                         │
//! ├───────────────────────────────┬─────────────────────────────────┤
//! │   Outbound Selectors          │   Reply Selectors               │
//! │  ┌──────────┐ ┌────────────┐  │  ┌─────────┐ ┌───────┐ ┌──────┐ │
//! │  │  Sticky  │ │   Probed   │  │  │  Round  │ │Content│ │Strat-│ │
//! │  │ failover │ │ (+ prober) │  │  │  Robin  │ │ Based │ │ egic │ │
//! │  └──────────┘ └────────────┘  │  └─────────┘ └───────┘ └──────┘ │
//! ├───────────────────────────────┴─────────────────────────────────┤
//! │               Path Stats Store (latency, liveness)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │              Path Model  ·  Path Query (external)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]
#![allow(clippy::cast_possible_truncation)]  // Wire fields are range-checked
#![allow(clippy::significant_drop_tightening)] // Lock scopes are intentional
#![allow(clippy::option_if_let_else)]
#![allow(clippy::use_self)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::future_not_send)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod multipath;
pub mod path;
pub mod protocol;
pub mod reply;
pub mod transport;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Probe wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::metrics::PathStatsStore;
    pub use crate::multipath::{ProbedSelector, Selector, StickySelector};
    pub use crate::path::{Path, PathFingerprint, PathMetadata, PathQuerier};
    pub use crate::reply::{
        ContentBasedReplySelector, ReplySelector, RoundRobinReplySelector,
        StrategicReplySelector,
    };
    pub use crate::types::*;
}
