//! Daemon-wide configuration.
//!
//! Everything here is fixed once startup validation passes; handlers and
//! workers receive it through an `Arc` rather than process globals.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Multicast group of the command channel.
    pub group: Ipv4Addr,
    /// UDP command port.
    pub cmd_port: u16,
    /// Maximum advertised space in bytes.
    pub max_space: u64,
    /// Directory the served files live in.
    pub shared_folder: PathBuf,
    /// How long a transfer worker waits for its peer to connect.
    pub timeout: Duration,
}

impl ServerConfig {
    /// Destination path for an uploaded basename.
    pub fn upload_path(&self, basename: &str) -> PathBuf {
        self.shared_folder.join(basename)
    }
}
