//! muster group file-sharing node (musterd).
//!
//! Advertises a pool of files on an IPv4 UDP multicast command channel,
//! answers group-wide discovery and search queries, and moves file bodies
//! over ephemeral unicast TCP connections negotiated on that channel.
//!
//! Usage:
//!   musterd -g <MCAST_ADDR> -p <CMD_PORT> -f <SHRD_FLDR> [OPTIONS]

mod daemon;
mod dispatch;
mod inventory;

use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use muster_core::multicast::McastEndpoint;
use muster_core::pending::PendingUploads;
use muster_proto::defaults::{
    DEFAULT_MAX_SPACE, DEFAULT_TIMEOUT_SECS, TIMEOUT_MAX_SECS, TIMEOUT_MIN_SECS,
};
use muster_proto::{NodeError, NodeResult};

use crate::daemon::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::inventory::Inventory;

/// muster group file-sharing node
#[derive(Parser, Debug)]
#[command(name = "musterd", version, about = "muster group file-sharing node")]
struct Args {
    /// Multicast group address of the command channel
    #[arg(short = 'g', long = "mcast-addr")]
    mcast_addr: String,

    /// UDP command port
    #[arg(short = 'p', long = "cmd-port")]
    cmd_port: u16,

    /// Maximum advertised space in bytes
    #[arg(short = 'b', long = "max-space", default_value_t = DEFAULT_MAX_SPACE)]
    max_space: u64,

    /// Directory with the served files
    #[arg(short = 'f', long = "shrd-fldr")]
    shrd_fldr: PathBuf,

    /// Seconds a transfer worker waits for its peer to connect
    #[arg(short = 't', long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Check every flag the parser cannot check by type alone.
fn validate(args: &Args) -> NodeResult<ServerConfig> {
    let group: Ipv4Addr = args
        .mcast_addr
        .parse()
        .map_err(|_| NodeError::BadMulticastAddr(args.mcast_addr.clone()))?;
    if args.cmd_port == 0 {
        return Err(NodeError::BadPort);
    }
    if !(TIMEOUT_MIN_SECS..=TIMEOUT_MAX_SECS).contains(&args.timeout) {
        return Err(NodeError::BadTimeout(args.timeout));
    }
    if !args.shrd_fldr.is_dir() {
        return Err(NodeError::BadSharedFolder(
            args.shrd_fldr.display().to_string(),
        ));
    }

    Ok(ServerConfig {
        group,
        cmd_port: args.cmd_port,
        max_space: args.max_space,
        shared_folder: args.shrd_fldr.clone(),
        timeout: Duration::from_secs(args.timeout),
    })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("musterd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match validate(&args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("musterd: {}", e);
            std::process::exit(1);
        }
    };

    let inventory = match Inventory::index(&config.shared_folder, config.max_space) {
        Ok(inventory) => inventory,
        Err(e) => {
            eprintln!("musterd: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "serving {} files from {}: {} bytes available, {} bytes over",
        inventory.len(),
        config.shared_folder.display(),
        inventory.available_space(),
        inventory.negative_space()
    );

    let endpoint = match McastEndpoint::open(config.group, config.cmd_port).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("musterd: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "command channel on group {} port {}",
        config.group, config.cmd_port
    );

    let pending = PendingUploads::new();
    let mut dispatcher = Dispatcher::new(
        config.clone(),
        endpoint.socket(),
        inventory,
        pending.clone(),
    );

    tokio::select! {
        result = dispatcher.run() => {
            if let Err(e) = result {
                error!("dispatcher failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
        }
    }

    // Membership is dropped exactly once; transfer tasks only hold plain
    // socket clones.
    endpoint.leave();
    drop(endpoint);

    for path in pending.drain() {
        match std::fs::remove_file(&path) {
            Ok(()) => info!("removed unfinished upload {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove unfinished upload {}: {}", path.display(), e),
        }
    }

    info!("musterd stopped");
    std::process::exit(1);
}
