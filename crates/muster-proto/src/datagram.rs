//! The two datagram shapes on the command channel.
//!
//! Wire layout (all integers unsigned big-endian):
//!
//! ```text
//! +-----------------+----------+-----------------+---------------+
//! | cmd (NUL-padded)| cmd_seq  | param (complex) | data          |
//! | 10 bytes        | 8 bytes  | 8 bytes         | rest          |
//! +-----------------+----------+-----------------+---------------+
//! ```
//!
//! A simple datagram stops after `cmd_seq`; a complex one inserts `param`
//! before the payload. The payload is opaque bytes here; handlers decide
//! where the protocol makes it textual.

use crate::constants::{
    CMD_LEN, CMPLX_HEADER_LEN, MAX_CMPLX_DATA_LEN, MAX_SIMPL_DATA_LEN, SIMPL_HEADER_LEN,
};
use crate::error::{NodeError, NodeResult};

/// A received command equals a literal tag iff the tag is a prefix of the
/// 10-byte field and every byte after it is NUL. Case sensitive, never a
/// substring match.
pub fn cmd_matches(cmd: &[u8; CMD_LEN], tag: &[u8]) -> bool {
    if tag.len() > CMD_LEN || &cmd[..tag.len()] != tag {
        return false;
    }
    cmd[tag.len()..].iter().all(|&b| b == 0)
}

/// NUL-pad a command tag into the fixed-width field.
fn pad_cmd(tag: &[u8]) -> [u8; CMD_LEN] {
    debug_assert!(tag.len() <= CMD_LEN);
    let mut cmd = [0u8; CMD_LEN];
    cmd[..tag.len()].copy_from_slice(tag);
    cmd
}

fn read_u64(buf: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[..8]);
    u64::from_be_bytes(b)
}

/// A simple command datagram: tag, sequence number, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCmd {
    pub cmd: [u8; CMD_LEN],
    pub cmd_seq: u64,
    pub data: Vec<u8>,
}

impl SimpleCmd {
    pub fn new(tag: &[u8], cmd_seq: u64, data: Vec<u8>) -> Self {
        Self {
            cmd: pad_cmd(tag),
            cmd_seq,
            data,
        }
    }

    /// Parse a simple datagram. Inputs shorter than the fixed prefix are
    /// rejected.
    pub fn decode(buf: &[u8]) -> NodeResult<Self> {
        if buf.len() < SIMPL_HEADER_LEN {
            return Err(NodeError::TooShort {
                need: SIMPL_HEADER_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            cmd: pad_cmd(&buf[..CMD_LEN]),
            cmd_seq: read_u64(&buf[CMD_LEN..SIMPL_HEADER_LEN]),
            data: buf[SIMPL_HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize into one wire datagram, refusing payloads that would not
    /// fit in a single UDP packet.
    pub fn encode(&self) -> NodeResult<Vec<u8>> {
        if self.data.len() > MAX_SIMPL_DATA_LEN {
            return Err(NodeError::PayloadTooLong {
                len: self.data.len(),
            });
        }
        let mut buf = Vec::with_capacity(SIMPL_HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.cmd);
        buf.extend_from_slice(&self.cmd_seq.to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// Canonical tag equality (prefix plus NUL tail).
    pub fn is(&self, tag: &[u8]) -> bool {
        cmd_matches(&self.cmd, tag)
    }
}

/// A complex command datagram: tag, sequence number, parameter, payload.
///
/// The parameter carries whatever the command defines: a byte count for
/// `ADD`, a TCP port for the transfer handshakes, the available space for
/// `GOOD_DAY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexCmd {
    pub cmd: [u8; CMD_LEN],
    pub cmd_seq: u64,
    pub param: u64,
    pub data: Vec<u8>,
}

impl ComplexCmd {
    pub fn new(tag: &[u8], cmd_seq: u64, param: u64, data: Vec<u8>) -> Self {
        Self {
            cmd: pad_cmd(tag),
            cmd_seq,
            param,
            data,
        }
    }

    /// Parse a complex datagram. Inputs shorter than the fixed prefix are
    /// rejected.
    pub fn decode(buf: &[u8]) -> NodeResult<Self> {
        if buf.len() < CMPLX_HEADER_LEN {
            return Err(NodeError::TooShort {
                need: CMPLX_HEADER_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            cmd: pad_cmd(&buf[..CMD_LEN]),
            cmd_seq: read_u64(&buf[CMD_LEN..SIMPL_HEADER_LEN]),
            param: read_u64(&buf[SIMPL_HEADER_LEN..CMPLX_HEADER_LEN]),
            data: buf[CMPLX_HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize into one wire datagram, refusing payloads that would not
    /// fit in a single UDP packet.
    pub fn encode(&self) -> NodeResult<Vec<u8>> {
        if self.data.len() > MAX_CMPLX_DATA_LEN {
            return Err(NodeError::PayloadTooLong {
                len: self.data.len(),
            });
        }
        let mut buf = Vec::with_capacity(CMPLX_HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.cmd);
        buf.extend_from_slice(&self.cmd_seq.to_be_bytes());
        buf.extend_from_slice(&self.param.to_be_bytes());
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// Canonical tag equality (prefix plus NUL tail).
    pub fn is(&self, tag: &[u8]) -> bool {
        cmd_matches(&self.cmd, tag)
    }
}
