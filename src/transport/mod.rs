//! Probe transport.
//!
//! The prober talks to the network only through [`Pinger`] and
//! [`PingerFactory`]. The UDP implementation in [`udp`] carries the echo
//! probes of [`crate::protocol`]; tests substitute scripted pingers.

mod udp;

pub use udp::{EchoResponder, UdpPinger, UdpPingerFactory};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::path::{Path, PathFingerprint};
use crate::types::{IsdAsn, ScionAddr};

pub use crate::protocol::ProbeError;

/// Capacity of the reply channel handed out by pinger factories.
pub const REPLY_CHANNEL_CAPACITY: usize = 256;

/// Who answered a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeSource {
    /// An IP host.
    Ip(ScionAddr),
    /// A host without an IP address (e.g. a service address) in this domain.
    NonIp(IsdAsn),
}

/// A probe reply, or a fault reported in place of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    pub source: ProbeSource,
    pub sequence: u16,
    /// Path the answered probe travelled, when it can be recovered.
    pub fingerprint: Option<PathFingerprint>,
    pub rtt: Duration,
    pub error: Option<ProbeError>,
}

/// Sends echo probes.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Send one probe to `remote` over `path`, padded with `size` bytes.
    async fn send(&self, remote: ScionAddr, path: &Path, sequence: u16, size: usize) -> Result<()>;
}

/// Creates a pinger bound to a local address, together with its reply stream.
///
/// Dropping the returned pinger stops the reply stream.
pub trait PingerFactory: Send + Sync {
    fn create(&self, local: ScionAddr) -> Result<(Arc<dyn Pinger>, mpsc::Receiver<ProbeReply>)>;
}
