//! Error types for pathsel.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::types::IsdAsn;

/// Result type alias for pathsel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pathsel.
#[derive(Error, Debug)]
pub enum Error {
    // Selection errors
    #[error("no paths available")]
    NoPaths,

    #[error("path query for {destination} failed: {reason}")]
    PathQuery { destination: IsdAsn, reason: String },

    #[error("prober setup failed: {0}")]
    ProberSetup(String),

    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Probe transport errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("no runtime available to drive the pinger")]
    NoRuntime,
}

/// Probe packet parsing errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("invalid version: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("truncated packet: {len} bytes (min {min})")]
    Truncated { len: usize, min: usize },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("probe size too large: {size} bytes (max {max})")]
    ProbeTooLarge { size: usize, max: usize },
}

impl Error {
    /// Check if error is transient (the operation may succeed later).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoPaths
                | Error::PathQuery { .. }
                | Error::Transport(
                    TransportError::SendFailed(_) | TransportError::ReceiveFailed(_)
                )
                | Error::Io(_)
        )
    }
}
