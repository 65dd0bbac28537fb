/// Unified error type for all muster components.

use std::io;

use thiserror::Error;

/// Everything that can go wrong in a muster node, from startup validation
/// through datagram handling to transfer I/O.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("datagram too short: need {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("payload of {len} bytes does not fit in one datagram")]
    PayloadTooLong { len: usize },
    #[error("bad multicast address '{0}'")]
    BadMulticastAddr(String),
    #[error("command port must be greater than zero")]
    BadPort,
    #[error("timeout {0} outside the accepted range")]
    BadTimeout(u64),
    #[error("shared folder '{0}' is not a directory")]
    BadSharedFolder(String),
    #[error("peer did not connect before the handshake timeout")]
    HandshakeTimeout,
    #[error("peer closed before the announced byte count arrived")]
    ShortTransfer,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for muster operations.
pub type NodeResult<T> = Result<T, NodeError>;
