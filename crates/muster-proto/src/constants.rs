/// muster wire protocol constants.

/// Width of the command field at the start of every datagram.
/// Shorter tags are NUL-padded on the right.
pub const CMD_LEN: usize = 10;

/// Fixed prefix of a simple datagram: cmd + cmd_seq.
pub const SIMPL_HEADER_LEN: usize = 18;

/// Fixed prefix of a complex datagram: cmd + cmd_seq + param.
pub const CMPLX_HEADER_LEN: usize = 26;

/// Largest datagram put on the wire. Everything the server sends fits in
/// one UDP packet of this size; longer listings are segmented.
pub const MAX_SIMPL: usize = 512;

/// Payload capacity of a simple datagram.
pub const MAX_SIMPL_DATA_LEN: usize = MAX_SIMPL - SIMPL_HEADER_LEN;

/// Payload capacity of a complex datagram.
pub const MAX_CMPLX_DATA_LEN: usize = MAX_SIMPL - CMPLX_HEADER_LEN;

/// Group discovery request (client to server, simple, empty data).
pub const CMD_HELLO: &[u8] = b"HELLO";
/// Discovery reply (server to client, complex): param carries the
/// available space, data the multicast group address.
pub const CMD_GOOD_DAY: &[u8] = b"GOOD_DAY";
/// Search request (client to server, simple): data is a basename substring.
pub const CMD_LIST: &[u8] = b"LIST";
/// Search reply (server to client, simple): data is newline-joined basenames.
pub const CMD_MY_LIST: &[u8] = b"MY_LIST";
/// Fetch request (client to server, simple): data is a served basename.
pub const CMD_GET: &[u8] = b"GET";
/// Fetch handshake (server to client, complex): param carries the
/// ephemeral TCP port, data echoes the basename.
pub const CMD_CONNECT_ME: &[u8] = b"CONNECT_ME";
/// Delete request (client to server, simple): data is a served basename.
pub const CMD_DEL: &[u8] = b"DEL";
/// Upload request (client to server, complex): param is the byte count,
/// data the proposed basename.
pub const CMD_ADD: &[u8] = b"ADD";
/// Upload handshake (server to client, complex): param carries the
/// ephemeral TCP port, data is empty.
pub const CMD_CAN_ADD: &[u8] = b"CAN_ADD";
/// Upload rejection (server to client, simple): data echoes the proposed
/// basename.
pub const CMD_NO_WAY: &[u8] = b"NO_WAY";
