//! One-shot transfer workers.
//!
//! Each `GET` or `ADD` spawns one of these as an independent task. The
//! worker binds a TCP socket on an ephemeral port, announces the port in
//! a handshake datagram on the command channel, waits a bounded time for
//! the peer to connect, and then streams one file. A failure aborts the
//! worker alone; the dispatcher keeps serving.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use muster_proto::constants::{CMD_CAN_ADD, CMD_CONNECT_ME};
use muster_proto::defaults::{TCP_BACKLOG, TRANSFER_BUF_SIZE};
use muster_proto::{ComplexCmd, NodeError, NodeResult};

use crate::pending::UploadGuard;

/// Bind a listening TCP socket on a kernel-assigned port.
async fn listen_ephemeral() -> NodeResult<(TcpListener, u16)> {
    let socket = TcpSocket::new_v4()?;
    socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    let listener = socket.listen(TCP_BACKLOG)?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Announce the ephemeral port to the peer and wait for it to connect.
async fn handshake_accept(
    listener: TcpListener,
    udp: &UdpSocket,
    peer: SocketAddr,
    tag: &[u8],
    data: Vec<u8>,
    cmd_seq: u64,
    port: u16,
    wait: Duration,
) -> NodeResult<TcpStream> {
    let handshake = ComplexCmd::new(tag, cmd_seq, u64::from(port), data).encode()?;
    udp.send_to(&handshake, peer).await?;

    match timeout(wait, listener.accept()).await {
        Ok(Ok((stream, addr))) => {
            debug!("peer {} connected on port {}", addr, port);
            Ok(stream)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(NodeError::HandshakeTimeout),
    }
}

/// Stream `path` to the peer that requested it.
///
/// Sends `CONNECT_ME` echoing the requested basename with the ephemeral
/// port as the parameter. A peer that never connects is a clean exit.
pub async fn send_file(
    udp: Arc<UdpSocket>,
    peer: SocketAddr,
    cmd_seq: u64,
    basename: String,
    path: PathBuf,
    wait: Duration,
) -> NodeResult<()> {
    let (listener, port) = listen_ephemeral().await?;
    let mut stream = match handshake_accept(
        listener,
        &udp,
        peer,
        CMD_CONNECT_ME,
        basename.into_bytes(),
        cmd_seq,
        port,
        wait,
    )
    .await
    {
        Ok(stream) => stream,
        Err(NodeError::HandshakeTimeout) => {
            debug!("peer {} never connected for {}", peer, path.display());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let mut file = tokio::fs::File::open(&path).await?;
    let mut buf = vec![0u8; TRANSFER_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
    }
    stream.shutdown().await?;

    debug!("sent {} to {}", path.display(), peer);
    Ok(())
}

/// Receive exactly `expected` bytes from the peer into the guarded
/// destination.
///
/// Sends `CAN_ADD` with the ephemeral port as the parameter. Peer EOF
/// before `expected` bytes, or any I/O failure, deletes the partial file.
/// The guard deregisters the destination whichever way the worker exits.
pub async fn receive_file(
    udp: Arc<UdpSocket>,
    peer: SocketAddr,
    cmd_seq: u64,
    guard: UploadGuard,
    expected: u64,
    wait: Duration,
) -> NodeResult<()> {
    let (listener, port) = match listen_ephemeral().await {
        Ok(pair) => pair,
        Err(e) => {
            guard.fail().await;
            return Err(e);
        }
    };

    let stream = match handshake_accept(
        listener,
        &udp,
        peer,
        CMD_CAN_ADD,
        Vec::new(),
        cmd_seq,
        port,
        wait,
    )
    .await
    {
        Ok(stream) => stream,
        Err(NodeError::HandshakeTimeout) => {
            debug!(
                "peer {} never connected for upload {}",
                peer,
                guard.path().display()
            );
            guard.fail().await;
            return Ok(());
        }
        Err(e) => {
            guard.fail().await;
            return Err(e);
        }
    };

    match copy_exact(stream, guard.path(), expected).await {
        Ok(()) => {
            debug!(
                "finalized upload {} ({} bytes)",
                guard.path().display(),
                expected
            );
            Ok(())
        }
        Err(e) => {
            guard.fail().await;
            Err(e)
        }
    }
}

/// Copy exactly `expected` bytes from the socket into a newly created
/// file with mode `rw-r--r--`. Bytes past `expected` are left unread.
async fn copy_exact(mut stream: TcpStream, path: &Path, expected: u64) -> NodeResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
        .await?;

    let mut remaining = expected;
    let mut buf = vec![0u8; TRANSFER_BUF_SIZE];
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = stream.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(NodeError::ShortTransfer);
        }
        file.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::PendingUploads;

    async fn udp_pair() -> (Arc<UdpSocket>, UdpSocket, SocketAddr) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();
        (Arc::new(server), client, client_addr)
    }

    async fn recv_handshake(client: &UdpSocket, tag: &[u8]) -> ComplexCmd {
        let mut buf = vec![0u8; 512];
        let (len, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let handshake = ComplexCmd::decode(&buf[..len]).unwrap();
        assert!(handshake.is(tag));
        handshake
    }

    #[tokio::test]
    async fn test_send_file_streams_contents() {
        let dir = std::env::temp_dir().join("muster_test_send");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("note.txt");
        std::fs::write(&path, b"ten bytes!").unwrap();

        let (server, client, client_addr) = udp_pair().await;
        let worker = tokio::spawn(send_file(
            server,
            client_addr,
            9,
            "note.txt".to_string(),
            path.clone(),
            Duration::from_secs(5),
        ));

        let handshake = recv_handshake(&client, CMD_CONNECT_ME).await;
        assert_eq!(handshake.cmd_seq, 9);
        assert_eq!(handshake.data, b"note.txt");

        let mut tcp = TcpStream::connect(("127.0.0.1", handshake.param as u16))
            .await
            .unwrap();
        let mut body = Vec::new();
        tcp.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"ten bytes!");

        worker.await.unwrap().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_receive_file_writes_announced_length() {
        let dir = std::env::temp_dir().join("muster_test_receive");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("upload.bin");

        let pending = PendingUploads::new();
        let guard = pending.register(path.clone());
        let (server, client, client_addr) = udp_pair().await;

        let worker = tokio::spawn(receive_file(
            server,
            client_addr,
            3,
            guard,
            10,
            Duration::from_secs(5),
        ));

        let handshake = recv_handshake(&client, CMD_CAN_ADD).await;
        assert_eq!(handshake.cmd_seq, 3);
        assert!(handshake.data.is_empty());

        let mut tcp = TcpStream::connect(("127.0.0.1", handshake.param as u16))
            .await
            .unwrap();
        tcp.write_all(b"ten bytes!").await.unwrap();
        tcp.shutdown().await.unwrap();

        worker.await.unwrap().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ten bytes!");
        assert!(pending.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_receive_file_short_upload_deletes_partial() {
        let dir = std::env::temp_dir().join("muster_test_receive_short");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("upload.bin");

        let pending = PendingUploads::new();
        let guard = pending.register(path.clone());
        let (server, client, client_addr) = udp_pair().await;

        let worker = tokio::spawn(receive_file(
            server,
            client_addr,
            4,
            guard,
            100,
            Duration::from_secs(5),
        ));

        let handshake = recv_handshake(&client, CMD_CAN_ADD).await;
        let mut tcp = TcpStream::connect(("127.0.0.1", handshake.param as u16))
            .await
            .unwrap();
        tcp.write_all(b"only a few").await.unwrap();
        tcp.shutdown().await.unwrap();
        drop(tcp);

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, NodeError::ShortTransfer));
        assert!(!path.exists());
        assert!(pending.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_receive_file_handshake_timeout_is_clean() {
        let dir = std::env::temp_dir().join("muster_test_receive_timeout");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("upload.bin");

        let pending = PendingUploads::new();
        let guard = pending.register(path.clone());
        let (server, client, client_addr) = udp_pair().await;

        let worker = tokio::spawn(receive_file(
            server,
            client_addr,
            5,
            guard,
            10,
            Duration::from_millis(100),
        ));

        // Read the handshake but never connect
        recv_handshake(&client, CMD_CAN_ADD).await;

        worker.await.unwrap().unwrap();
        assert!(!path.exists());
        assert!(pending.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_send_file_handshake_timeout_is_clean() {
        let dir = std::env::temp_dir().join("muster_test_send_timeout");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("note.txt");
        std::fs::write(&path, b"contents").unwrap();

        let (server, client, client_addr) = udp_pair().await;
        let worker = tokio::spawn(send_file(
            server,
            client_addr,
            6,
            "note.txt".to_string(),
            path.clone(),
            Duration::from_millis(100),
        ));

        recv_handshake(&client, CMD_CONNECT_ME).await;

        worker.await.unwrap().unwrap();
        // The served file is untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"contents");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
