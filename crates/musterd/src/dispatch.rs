//! The UDP command dispatcher.
//!
//! A single task serializes all command handling: receive one datagram,
//! validate it, run the handler, repeat. Each `GET` or `ADD` spawns an
//! independent transfer task that owns a snapshot of what it needs (the
//! target path, the announced length) plus a write-only clone of the
//! command socket, so the inventory stays single-owner and lock-free.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use muster_core::pending::PendingUploads;
use muster_core::transfer;
use muster_proto::constants::{
    CMD_ADD, CMD_DEL, CMD_GET, CMD_GOOD_DAY, CMD_HELLO, CMD_LIST, CMD_MY_LIST, CMD_NO_WAY,
    MAX_SIMPL_DATA_LEN,
};
use muster_proto::defaults::RECV_BUF_SIZE;
use muster_proto::{ComplexCmd, NodeResult, SimpleCmd};

use crate::daemon::ServerConfig;
use crate::inventory::Inventory;

pub struct Dispatcher {
    config: Arc<ServerConfig>,
    socket: Arc<UdpSocket>,
    inventory: Inventory,
    pending: Arc<PendingUploads>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ServerConfig>,
        socket: Arc<UdpSocket>,
        inventory: Inventory,
        pending: Arc<PendingUploads>,
    ) -> Self {
        Self {
            config,
            socket,
            inventory,
            pending,
        }
    }

    /// Receive and handle datagrams until the socket fails. A receive
    /// error is fatal; everything a peer can provoke is not.
    pub async fn run(&mut self) -> NodeResult<()> {
        let mut buf = vec![0u8; RECV_BUF_SIZE];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            self.handle_datagram(&buf[..len], peer).await;
        }
    }

    /// Decode one datagram and route it to its handler.
    pub async fn handle_datagram(&mut self, buf: &[u8], peer: SocketAddr) {
        let request = match SimpleCmd::decode(buf) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping datagram from {}: {}", peer, e);
                return;
            }
        };

        if request.is(CMD_HELLO) {
            self.discover(peer, &request).await;
        } else if request.is(CMD_DEL) {
            self.remove(peer, &request);
        } else if request.is(CMD_LIST) {
            self.list(peer, &request).await;
        } else if request.is(CMD_GET) {
            self.fetch(peer, &request).await;
        } else if request.is(CMD_ADD) {
            match ComplexCmd::decode(buf) {
                Ok(request) => self.upload(peer, request).await,
                Err(e) => warn!("dropping datagram from {}: {}", peer, e),
            }
        } else {
            warn!("unknown command from {}", peer);
        }
    }

    /// `HELLO` → `GOOD_DAY` carrying the group address and the available
    /// space, echoing the request's sequence number.
    async fn discover(&self, peer: SocketAddr, request: &SimpleCmd) {
        if !request.data.is_empty() {
            warn!("HELLO from {} with non-empty data", peer);
            return;
        }
        let reply = ComplexCmd::new(
            CMD_GOOD_DAY,
            request.cmd_seq,
            self.inventory.available_space(),
            self.config.group.to_string().into_bytes(),
        );
        self.send(peer, reply.encode()).await;
    }

    /// `LIST` → matching basenames joined by newlines, split across as
    /// many `MY_LIST` datagrams as needed. Every datagram reuses the
    /// request's sequence number; no matches means no reply at all.
    async fn list(&self, peer: SocketAddr, request: &SimpleCmd) {
        let pattern = String::from_utf8_lossy(&request.data);
        let matches = self.inventory.search(&pattern);

        let mut data: Vec<u8> = Vec::new();
        for basename in matches {
            if basename.len() > MAX_SIMPL_DATA_LEN {
                warn!("basename does not fit in one datagram: {}", basename);
                continue;
            }
            if !data.is_empty() && data.len() + 1 + basename.len() > MAX_SIMPL_DATA_LEN {
                let packet = SimpleCmd::new(CMD_MY_LIST, request.cmd_seq, std::mem::take(&mut data));
                self.send(peer, packet.encode()).await;
            }
            if !data.is_empty() {
                data.push(b'\n');
            }
            data.extend_from_slice(basename.as_bytes());
        }
        if !data.is_empty() {
            let packet = SimpleCmd::new(CMD_MY_LIST, request.cmd_seq, data);
            self.send(peer, packet.encode()).await;
        }
    }

    /// `DEL` → unlink and credit space. No reply either way.
    fn remove(&mut self, peer: SocketAddr, request: &SimpleCmd) {
        if request.data.is_empty() {
            warn!("DEL from {} with empty data", peer);
            return;
        }
        let basename = String::from_utf8_lossy(&request.data).into_owned();
        if self.pending.contains(&self.config.upload_path(&basename)) {
            debug!("refusing DEL of in-flight upload {}", basename);
            return;
        }
        self.inventory.remove(&self.config.shared_folder, &basename);
    }

    /// `GET` → spawn a send worker for a served basename; unknown names
    /// get a free-form diagnostic instead of a handshake.
    async fn fetch(&self, peer: SocketAddr, request: &SimpleCmd) {
        if request.data.is_empty() {
            warn!("GET from {} with empty data", peer);
            return;
        }
        let basename = String::from_utf8_lossy(&request.data).into_owned();
        if self.inventory.find(&basename).is_none() {
            debug!("GET from {} for unknown file {}", peer, basename);
            self.send_diagnostic(peer, "invalid file name").await;
            return;
        }

        let udp = self.socket.clone();
        let path = self.config.shared_folder.join(&basename);
        let wait = self.config.timeout;
        let cmd_seq = request.cmd_seq;
        tokio::spawn(async move {
            if let Err(e) = transfer::send_file(udp, peer, cmd_seq, basename, path, wait).await {
                warn!("send to {} failed: {}", peer, e);
            }
        });
    }

    /// `ADD` → reserve space, register the basename, and spawn a receive
    /// worker; anything unacceptable is answered with `NO_WAY`.
    async fn upload(&mut self, peer: SocketAddr, request: ComplexCmd) {
        let basename = String::from_utf8_lossy(&request.data).into_owned();

        // reserve() must come last: it debits on success
        let accepted = !basename.is_empty()
            && !basename.contains('/')
            && self.inventory.find(&basename).is_none()
            && self.inventory.reserve(request.param);

        if !accepted {
            debug!(
                "refusing upload of '{}' ({} bytes) from {}",
                basename, request.param, peer
            );
            let reply = SimpleCmd::new(CMD_NO_WAY, request.cmd_seq, request.data);
            self.send(peer, reply.encode()).await;
            return;
        }

        self.inventory
            .register_basename(basename.clone(), request.param);
        let guard = self.pending.register(self.config.upload_path(&basename));

        let udp = self.socket.clone();
        let wait = self.config.timeout;
        let cmd_seq = request.cmd_seq;
        let expected = request.param;
        tokio::spawn(async move {
            if let Err(e) = transfer::receive_file(udp, peer, cmd_seq, guard, expected, wait).await
            {
                warn!("upload of {} failed: {}", basename, e);
            }
        });
    }

    async fn send(&self, peer: SocketAddr, encoded: NodeResult<Vec<u8>>) {
        match encoded {
            Ok(bytes) => {
                if let Err(e) = self.socket.send_to(&bytes, peer).await {
                    warn!("failed to reply to {}: {}", peer, e);
                }
            }
            Err(e) => warn!("failed to encode reply for {}: {}", peer, e),
        }
    }

    /// Free-form textual diagnostic. Advisory only; clients treat the
    /// absence of a structured reply as a timeout.
    async fn send_diagnostic(&self, peer: SocketAddr, msg: &str) {
        if let Err(e) = self.socket.send_to(msg.as_bytes(), peer).await {
            warn!("failed to send diagnostic to {}: {}", peer, e);
        }
    }
}
