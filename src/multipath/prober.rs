//! Active probing loop.
//!
//! One task per probed selector. Each tick starts a new [`ProbeRound`]: the
//! sequence number advances, one probe goes out per active path and the round
//! timeout is armed. The round settles when every probed path answered or the
//! timeout fired; unanswered paths are then charged the timeout as latency and
//! the selection is recomputed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::probed::Shared;
use crate::metrics::PathStatsStore;
use crate::path::{Path, PathFingerprint};
use crate::transport::{Pinger, ProbeReply, ProbeSource};
use crate::types::ScionAddr;

/// What a reply did to the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Latency recorded for a pending path.
    Matched,
    /// The reply reported a down interface.
    Down,
    /// Stale, foreign or malformed; dropped.
    Ignored,
}

/// Bookkeeping of one probe round.
#[derive(Debug, Default)]
pub struct ProbeRound {
    sequence: u16,
    pending: HashSet<PathFingerprint>,
}

impl ProbeRound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the current round.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Begin a round over `paths`, returning its sequence number.
    pub fn start(&mut self, paths: &[Arc<Path>]) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        self.pending = paths.iter().map(|p| p.fingerprint()).collect();
        self.sequence
    }

    /// Apply one reply from the pinger.
    pub fn handle_reply(
        &mut self,
        reply: &ProbeReply,
        remote: ScionAddr,
        stats: &PathStatsStore,
    ) -> ProbeOutcome {
        if let Some(error) = reply.error {
            let Some(fingerprint) = reply.fingerprint else {
                tracing::trace!(error = %error, "Probe error without path, dropping");
                return ProbeOutcome::Ignored;
            };
            tracing::debug!(path = %fingerprint, error = %error, "Probe reported path down");
            stats.notify_path_down(fingerprint, error.down_interface());
            return ProbeOutcome::Down;
        }

        let source = match reply.source {
            ProbeSource::Ip(addr) => addr,
            ProbeSource::NonIp(ia) => {
                tracing::trace!(ia = %ia, "Probe reply from non-IP host, dropping");
                return ProbeOutcome::Ignored;
            }
        };
        if source != remote {
            tracing::trace!(source = %source, remote = %remote, "Probe reply from unexpected source");
            return ProbeOutcome::Ignored;
        }
        if reply.sequence != self.sequence {
            tracing::trace!(
                got = reply.sequence,
                expected = self.sequence,
                "Stale probe reply"
            );
            return ProbeOutcome::Ignored;
        }
        let Some(fingerprint) = reply.fingerprint.filter(|fp| self.pending.remove(fp)) else {
            tracing::trace!(path = ?reply.fingerprint, "Probe reply for unexpected path");
            return ProbeOutcome::Ignored;
        };

        stats.record_latency(remote, fingerprint, reply.rtt);
        ProbeOutcome::Matched
    }

    /// Charge every pending path `penalty` as latency and settle the round.
    pub fn expire(&mut self, remote: ScionAddr, stats: &PathStatsStore, penalty: Duration) -> usize {
        let expired = self.pending.len();
        for fingerprint in self.pending.drain() {
            stats.record_timeout(remote, fingerprint, penalty);
        }
        expired
    }
}

pub(super) async fn run(
    shared: Arc<Shared>,
    remote: ScionAddr,
    pinger: Arc<dyn Pinger>,
    mut replies: mpsc::Receiver<ProbeReply>,
    cancel: CancellationToken,
) {
    let interval = shared.config.interval;
    let penalty = shared.config.timeout;
    let size = shared.config.probe_size;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(deadline);
    let mut armed = false;
    let mut round = ProbeRound::new();

    tracing::debug!(remote = %remote, interval = ?interval, timeout = ?penalty, "Prober started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            _ = ticker.tick() => {
                if armed && !round.is_settled() {
                    round.expire(remote, &shared.stats, penalty);
                    shared.reselect();
                }

                let paths = shared.active_paths();
                if paths.is_empty() {
                    armed = false;
                    continue;
                }

                let sequence = round.start(&paths);
                for path in &paths {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if let Err(e) = pinger.send(remote, path, sequence, size).await {
                        tracing::debug!(path = %path.fingerprint(), error = %e, "Probe send failed");
                    }
                }
                deadline.as_mut().reset(Instant::now() + penalty);
                armed = true;
            }

            reply = replies.recv() => {
                let Some(reply) = reply else {
                    tracing::warn!(remote = %remote, "Probe reply stream closed, stopping prober");
                    break;
                };
                match round.handle_reply(&reply, remote, &shared.stats) {
                    ProbeOutcome::Down => shared.reselect(),
                    ProbeOutcome::Matched if armed && round.is_settled() => {
                        armed = false;
                        shared.reselect();
                    }
                    _ => {}
                }
            }

            () = &mut deadline, if armed => {
                armed = false;
                if !round.is_settled() {
                    let expired = round.expire(remote, &shared.stats, penalty);
                    tracing::trace!(remote = %remote, expired, "Probe round timed out");
                    shared.reselect();
                }
            }
        }
    }

    tracing::debug!(remote = %remote, "Prober stopped");
}
