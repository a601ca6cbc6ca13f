//! Probe wire protocol.
//!
//! Echo probes are sent over each active path and answered by the remote's
//! echo responder. Replies echo the request's sequence, timestamp and path
//! fingerprint, and may carry a fault naming an interface that is down.
//!
//! ## Packet Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Version (1) │ Type (1) │ Sequence (2) │ Timestamp (8)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                    Path Fingerprint (32)                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Responder IA (8) │ Fault Kind (1) │ Fault IA (8)                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Fault IfId A (8) │ Fault IfId B (8) │ Checksum (4) │ Padding ... │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod probe;

pub use probe::{ProbeError, ProbePacket, ProbeType};

use crate::PROTOCOL_VERSION;

/// Fixed probe header size in bytes.
pub const HEADER_SIZE: usize = 81;

/// Largest padding a probe may carry.
pub const MAX_PROBE_PAYLOAD: usize = 1024;

/// Calculate CRC32 checksum.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verify protocol version compatibility.
pub fn is_compatible_version(version: u8) -> bool {
    version == PROTOCOL_VERSION
}
