//! Echo probe packets.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::error::{ProtocolError, Result};
use crate::path::PathFingerprint;
use crate::types::{IfId, IsdAsn, PathInterface};
use crate::PROTOCOL_VERSION;

use super::{HEADER_SIZE, MAX_PROBE_PAYLOAD};

const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

const FAULT_NONE: u8 = 0;
const FAULT_INTERNAL: u8 = 1;
const FAULT_EXTERNAL: u8 = 2;

/// Probe packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProbeType {
    EchoRequest = 1,
    EchoReply = 2,
}

impl ProbeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::EchoRequest),
            2 => Some(Self::EchoReply),
            _ => None,
        }
    }
}

/// Fault reported instead of (or along with) an echo reply.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeError {
    #[error("internal connectivity down in {ia} between #{ingress} and #{egress}")]
    InternalConnectivityDown {
        ia: IsdAsn,
        ingress: IfId,
        egress: IfId,
    },

    #[error("external interface #{interface} down in {ia}")]
    ExternalInterfaceDown { ia: IsdAsn, interface: IfId },
}

impl ProbeError {
    /// Interface the fault names as down. For broken internal connectivity
    /// that is the egress side.
    pub fn down_interface(&self) -> PathInterface {
        match *self {
            Self::InternalConnectivityDown { ia, egress, .. } => PathInterface { ia, ifid: egress },
            Self::ExternalInterfaceDown { ia, interface } => PathInterface { ia, ifid: interface },
        }
    }
}

/// A decoded probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePacket {
    pub probe_type: ProbeType,
    pub sequence: u16,
    /// Send time of the request (microseconds since epoch), echoed in replies.
    pub timestamp: u64,
    /// Path the request was sent on.
    pub fingerprint: PathFingerprint,
    /// Routing domain of the responder; wildcard in requests.
    pub responder: IsdAsn,
    pub fault: Option<ProbeError>,
}

impl ProbePacket {
    /// Echo request stamped with the current time.
    pub fn request(sequence: u16, fingerprint: PathFingerprint) -> Self {
        Self {
            probe_type: ProbeType::EchoRequest,
            sequence,
            timestamp: now_micros(),
            fingerprint,
            responder: IsdAsn::WILDCARD,
            fault: None,
        }
    }

    /// Reply to this request, answered from `responder`.
    pub fn reply(&self, responder: IsdAsn, fault: Option<ProbeError>) -> Self {
        Self {
            probe_type: ProbeType::EchoReply,
            responder,
            fault,
            ..self.clone()
        }
    }

    /// Encode with `padding` zero bytes after the header.
    pub fn encode(&self, padding: usize) -> Result<Vec<u8>> {
        if padding > MAX_PROBE_PAYLOAD {
            return Err(ProtocolError::ProbeTooLarge {
                size: padding,
                max: MAX_PROBE_PAYLOAD,
            }
            .into());
        }

        let mut buf = vec![0u8; HEADER_SIZE + padding];
        buf[0] = PROTOCOL_VERSION;
        buf[1] = self.probe_type as u8;
        BigEndian::write_u16(&mut buf[2..4], self.sequence);
        BigEndian::write_u64(&mut buf[4..12], self.timestamp);
        buf[12..44].copy_from_slice(self.fingerprint.as_bytes());
        BigEndian::write_u64(&mut buf[44..52], self.responder.0);

        let (kind, ia, a, b) = match self.fault {
            None => (FAULT_NONE, 0, 0, 0),
            Some(ProbeError::InternalConnectivityDown { ia, ingress, egress }) => {
                (FAULT_INTERNAL, ia.0, ingress.0, egress.0)
            }
            Some(ProbeError::ExternalInterfaceDown { ia, interface }) => {
                (FAULT_EXTERNAL, ia.0, interface.0, 0)
            }
        };
        buf[52] = kind;
        BigEndian::write_u64(&mut buf[53..61], ia);
        BigEndian::write_u64(&mut buf[61..69], a);
        BigEndian::write_u64(&mut buf[69..77], b);

        let sum = super::checksum(&buf[..CHECKSUM_OFFSET]);
        BigEndian::write_u32(&mut buf[CHECKSUM_OFFSET..HEADER_SIZE], sum);
        Ok(buf)
    }

    /// Decode a probe; trailing padding is ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                len: buf.len(),
                min: HEADER_SIZE,
            }
            .into());
        }

        let version = buf[0];
        if !super::is_compatible_version(version) {
            return Err(ProtocolError::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: version,
            }
            .into());
        }

        let checksum = BigEndian::read_u32(&buf[CHECKSUM_OFFSET..HEADER_SIZE]);
        if super::checksum(&buf[..CHECKSUM_OFFSET]) != checksum {
            return Err(ProtocolError::ChecksumMismatch.into());
        }

        let probe_type =
            ProbeType::from_u8(buf[1]).ok_or(ProtocolError::InvalidPacketType(buf[1]))?;

        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&buf[12..44]);

        let fault_ia = IsdAsn(BigEndian::read_u64(&buf[53..61]));
        let a = IfId(BigEndian::read_u64(&buf[61..69]));
        let b = IfId(BigEndian::read_u64(&buf[69..77]));
        let fault = match buf[52] {
            FAULT_INTERNAL => Some(ProbeError::InternalConnectivityDown {
                ia: fault_ia,
                ingress: a,
                egress: b,
            }),
            FAULT_EXTERNAL => Some(ProbeError::ExternalInterfaceDown {
                ia: fault_ia,
                interface: a,
            }),
            _ => None,
        };

        Ok(Self {
            probe_type,
            sequence: BigEndian::read_u16(&buf[2..4]),
            timestamp: BigEndian::read_u64(&buf[4..12]),
            fingerprint: PathFingerprint(fingerprint),
            responder: IsdAsn(BigEndian::read_u64(&buf[44..52])),
            fault,
        })
    }

    /// Time elapsed since the request was stamped, if the clock allows.
    pub fn elapsed(&self) -> Option<Duration> {
        now_micros()
            .checked_sub(self.timestamp)
            .map(Duration::from_micros)
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_micros() as u64
}
