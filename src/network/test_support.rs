//! Loopback helpers shared by the unit and integration tests.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::configuration::config::Config;
use crate::configuration::types::{AcceptErrorPolicy, Endpoint, LogSettings};

/// Upper bound for any single network wait in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Two ends of one loopback TCP connection: `(accepted side, connecting side)`.
pub async fn tcp_pair() -> std::io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;

    let client = tokio::spawn(async move { TcpStream::connect(addr).await });
    let (server_side, _) = listener.accept().await?;
    let client = client.await.unwrap()?;
    Ok((server_side, client))
}

pub async fn loopback_listener() -> TcpListener {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap()
}

/// A port nothing listens on (bound once, then released).
pub async fn unused_port() -> u16 {
    let listener = loopback_listener().await;
    listener.local_addr().unwrap().port()
}

/// Test peer: accepts one connection and collects everything it receives until EOF.
pub fn collecting_peer(listener: TcpListener) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let _ = conn.read_to_end(&mut received).await;
        received
    })
}

pub async fn collected(peer: JoinHandle<Vec<u8>>) -> Vec<u8> {
    timeout(TEST_TIMEOUT, peer)
        .await
        .expect("test peer timed out")
        .expect("test peer panicked")
}

/// Destination-only configuration pointing at `127.0.0.1:<destination_port>`.
pub fn config_for(destination_port: u16) -> Config {
    Config {
        source_port: 9999,
        destination: Endpoint::new("127.0.0.1", destination_port),
        upstream_mirror: None,
        downstream_mirror: None,
        upstream_capture_file: None,
        downstream_capture_file: None,
        log: LogSettings::default(),
        buffer_size: Config::DEFAULT_BUFFER_SIZE,
        accept_errors: AcceptErrorPolicy::Fatal,
    }
}
