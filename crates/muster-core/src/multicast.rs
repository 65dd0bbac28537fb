//! The UDP multicast command channel.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use muster_proto::NodeResult;

/// A UDP socket bound to the command port with group membership held for
/// the life of the endpoint.
///
/// The endpoint is owned by the dispatcher side alone; transfer workers
/// receive plain [`Arc<UdpSocket>`] clones and use them write-only.
pub struct McastEndpoint {
    socket: Arc<UdpSocket>,
    group: Ipv4Addr,
    left: AtomicBool,
}

impl McastEndpoint {
    /// Bind `0.0.0.0:port` and join `group` on the unspecified interface.
    pub async fn open(group: Ipv4Addr, port: u16) -> NodeResult<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        debug!("joined group {} on port {}", group, port);

        Ok(Self {
            socket: Arc::new(socket),
            group,
            left: AtomicBool::new(false),
        })
    }

    /// Handle for receiving commands and sending replies or handshakes.
    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }

    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    /// Drop group membership. Runs at most once per process; later calls,
    /// including the one from `Drop`, are no-ops.
    pub fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        match self
            .socket
            .leave_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED)
        {
            Ok(()) => debug!("left group {}", self.group),
            Err(e) => warn!("failed to leave group {}: {}", self.group, e),
        }
    }
}

impl Drop for McastEndpoint {
    fn drop(&mut self) {
        self.leave();
    }
}
