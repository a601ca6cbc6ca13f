//! UDP echo probing.
//!
//! Probes are sent to the first-hop underlay address of the probed path. The
//! [`EchoResponder`] answers them on the remote side.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Pinger, PingerFactory, ProbeError, ProbeReply, ProbeSource, REPLY_CHANNEL_CAPACITY};
use crate::error::{Result, TransportError};
use crate::path::Path;
use crate::protocol::{ProbePacket, ProbeType, HEADER_SIZE, MAX_PROBE_PAYLOAD};
use crate::types::{IsdAsn, ScionAddr};

const RECV_BUFFER_SIZE: usize = HEADER_SIZE + MAX_PROBE_PAYLOAD;

/// Pause after a receive error not tied to a single datagram.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Consecutive such errors after which a receive loop stops.
const MAX_RECV_ERRORS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvAction {
    Retry,
    Backoff,
    GiveUp,
}

/// Consecutive receive failures of one socket.
#[derive(Debug, Default)]
struct RecvErrors {
    consecutive: u32,
}

impl RecvErrors {
    fn on_error(&mut self, error: &io::Error) -> RecvAction {
        // ICMP errors for earlier sends surface on the next receive.
        if matches!(
            error.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        ) {
            return RecvAction::Retry;
        }
        self.consecutive += 1;
        if self.consecutive >= MAX_RECV_ERRORS {
            RecvAction::GiveUp
        } else {
            RecvAction::Backoff
        }
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Wait out a receive error. Returns false once the loop should stop.
    async fn recover(&mut self, error: &io::Error, cancel: &CancellationToken) -> bool {
        match self.on_error(error) {
            RecvAction::Retry => {
                tracing::trace!(error = %error, "Transient receive error");
                true
            }
            RecvAction::Backoff => {
                tracing::debug!(error = %error, failures = self.consecutive, "Receive failed, backing off");
                tokio::select! {
                    () = cancel.cancelled() => false,
                    () = tokio::time::sleep(RECV_ERROR_BACKOFF) => true,
                }
            }
            RecvAction::GiveUp => {
                tracing::warn!(error = %error, failures = self.consecutive, "Socket keeps failing, stopping receive loop");
                false
            }
        }
    }
}

/// Pinger over a plain UDP socket.
pub struct UdpPinger {
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
}

impl UdpPinger {
    /// Bind the probe socket and start draining replies.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(local: ScionAddr, bind_addr: SocketAddr) -> Result<(Self, mpsc::Receiver<ProbeReply>)> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TransportError::NoRuntime.into());
        }

        let bind_failed = |e: std::io::Error| TransportError::BindFailed {
            addr: bind_addr,
            reason: e.to_string(),
        };
        let std_socket = std::net::UdpSocket::bind(bind_addr).map_err(bind_failed)?;
        std_socket.set_nonblocking(true).map_err(bind_failed)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket).map_err(bind_failed)?);

        let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(drain_replies(Arc::clone(&socket), tx, cancel.clone()));

        tracing::debug!(
            local = %local,
            bind = ?socket.local_addr().ok(),
            "Pinger bound"
        );

        Ok((Self { socket, cancel }, rx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()).into())
    }
}

impl Drop for UdpPinger {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Pinger for UdpPinger {
    async fn send(&self, remote: ScionAddr, path: &Path, sequence: u16, size: usize) -> Result<()> {
        let buf = ProbePacket::request(sequence, path.fingerprint()).encode(size)?;
        self.socket
            .send_to(&buf, path.forwarding.underlay)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        tracing::trace!(
            remote = %remote,
            path = %path.fingerprint(),
            seq = sequence,
            "Probe sent"
        );
        Ok(())
    }
}

async fn drain_replies(
    socket: Arc<UdpSocket>,
    tx: mpsc::Sender<ProbeReply>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut errors = RecvErrors::default();
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            res = socket.recv_from(&mut buf) => res,
        };
        let (len, from) = match received {
            Ok(v) => {
                errors.reset();
                v
            }
            Err(e) => {
                if errors.recover(&e, &cancel).await {
                    continue;
                }
                break;
            }
        };

        let packet = match ProbePacket::decode(&buf[..len]) {
            Ok(p) if p.probe_type == ProbeType::EchoReply => p,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(from = %from, error = %e, "Dropping malformed probe reply");
                continue;
            }
        };

        let reply = ProbeReply {
            source: ProbeSource::Ip(ScionAddr::new(packet.responder, from.ip())),
            sequence: packet.sequence,
            fingerprint: Some(packet.fingerprint),
            rtt: packet.elapsed().unwrap_or_default(),
            error: packet.fault,
        };
        if tx.send(reply).await.is_err() {
            break;
        }
    }
    tracing::trace!("Probe reply drain stopped");
}

/// Binds one [`UdpPinger`] per prober.
#[derive(Debug, Clone, Copy)]
pub struct UdpPingerFactory {
    bind_addr: SocketAddr,
}

impl UdpPingerFactory {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }
}

impl Default for UdpPingerFactory {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 0)))
    }
}

impl PingerFactory for UdpPingerFactory {
    fn create(&self, local: ScionAddr) -> Result<(Arc<dyn Pinger>, mpsc::Receiver<ProbeReply>)> {
        let (pinger, replies) = UdpPinger::bind(local, self.bind_addr)?;
        Ok((Arc::new(pinger), replies))
    }
}

/// Answers echo probes on behalf of a remote routing domain.
pub struct EchoResponder {
    addr: SocketAddr,
    fault: Arc<Mutex<Option<ProbeError>>>,
    responding: Arc<AtomicBool>,
    answered: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl EchoResponder {
    pub async fn bind(ia: IsdAsn, addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr,
                reason: e.to_string(),
            })?;
        let addr = socket
            .local_addr()
            .map_err(|e| TransportError::BindFailed {
                addr,
                reason: e.to_string(),
            })?;

        let responder = Self {
            addr,
            fault: Arc::new(Mutex::new(None)),
            responding: Arc::new(AtomicBool::new(true)),
            answered: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
        };

        tokio::spawn(answer_probes(
            socket,
            ia,
            Arc::clone(&responder.fault),
            Arc::clone(&responder.responding),
            Arc::clone(&responder.answered),
            responder.cancel.clone(),
        ));

        tracing::debug!(ia = %ia, addr = %addr, "Echo responder listening");
        Ok(responder)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Report `fault` in every subsequent reply.
    pub fn set_fault(&self, fault: Option<ProbeError>) {
        *self.fault.lock() = fault;
    }

    /// Stop (or resume) answering probes.
    pub fn set_responding(&self, responding: bool) {
        self.responding.store(responding, Ordering::Relaxed);
    }

    /// Number of probes answered so far.
    pub fn answered(&self) -> u64 {
        self.answered.load(Ordering::Relaxed)
    }
}

impl Drop for EchoResponder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn answer_probes(
    socket: UdpSocket,
    ia: IsdAsn,
    fault: Arc<Mutex<Option<ProbeError>>>,
    responding: Arc<AtomicBool>,
    answered: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut errors = RecvErrors::default();
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            res = socket.recv_from(&mut buf) => res,
        };
        let (len, from) = match received {
            Ok(v) => {
                errors.reset();
                v
            }
            Err(e) => {
                if errors.recover(&e, &cancel).await {
                    continue;
                }
                break;
            }
        };

        if !responding.load(Ordering::Relaxed) {
            continue;
        }

        let request = match ProbePacket::decode(&buf[..len]) {
            Ok(p) if p.probe_type == ProbeType::EchoRequest => p,
            _ => continue,
        };

        let reply = request.reply(ia, *fault.lock());
        let encoded = match reply.encode(len - HEADER_SIZE) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to encode echo reply");
                continue;
            }
        };
        match socket.send_to(&encoded, from).await {
            Ok(_) => {
                answered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::debug!(to = %from, error = %e, "Echo reply failed"),
        }
    }
}
