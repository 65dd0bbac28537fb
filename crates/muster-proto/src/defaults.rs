//! Tunable operational defaults for the muster node.
//!
//! Protocol-level constants (wire layout, command tags) remain in
//! [`crate::constants`]. This module centralizes the configurable
//! defaults that can be overridden via CLI flags.

// ─── Space Accounting ───────────────────────────────────────────────────────

/// Default maximum advertised space in bytes (50 MiB).
pub const DEFAULT_MAX_SPACE: u64 = 52_428_800;

// ─── Transfer Handshake ─────────────────────────────────────────────────────

/// Default number of seconds a transfer worker waits for its peer to
/// connect to the announced ephemeral port.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Smallest accepted handshake timeout.
pub const TIMEOUT_MIN_SECS: u64 = 1;

/// Largest accepted handshake timeout.
pub const TIMEOUT_MAX_SECS: u64 = 300;

// ─── Transfer I/O ───────────────────────────────────────────────────────────

/// Fixed-size copy buffer used when streaming file bodies over TCP.
pub const TRANSFER_BUF_SIZE: usize = 8192;

/// Listen backlog for the per-transfer TCP socket. Each socket serves
/// exactly one peer.
pub const TCP_BACKLOG: u32 = 1;

// ─── Command Channel ────────────────────────────────────────────────────────

/// Receive buffer for the command socket. Larger than any valid datagram
/// so oversized garbage is received whole and rejected, not truncated.
pub const RECV_BUF_SIZE: usize = 64 * 1024;
