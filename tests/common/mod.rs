// tests/common/mod.rs

//! Shared harness for the integration tests: spins up a real server on a
//! loopback port and drives it over an actual TCP connection, the same way
//! `redis-cli` would.

use spineldb::config::{Config, ReplicationConfig};
use spineldb::core::protocol::RespFrame;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Ports are handed out from a fixed base so concurrently-running tests never
/// collide on the same loopback address.
static NEXT_PORT: AtomicU16 = AtomicU16::new(17_000);

pub fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::Relaxed)
}

/// Starts a leader on `port` and returns once it is accepting connections.
pub async fn spawn_leader(port: u16) {
    spawn_with_config(Config {
        port,
        ..Config::default()
    })
    .await;
}

/// Starts a follower replicating from `leader_port`, listening on `port`.
pub async fn spawn_follower(port: u16, leader_port: u16) {
    spawn_with_config(Config {
        port,
        replication: ReplicationConfig::Follower {
            host: "127.0.0.1".to_string(),
            port: leader_port,
        },
        ..Config::default()
    })
    .await;
}

async fn spawn_with_config(config: Config) {
    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = spineldb::server::run(config).await {
            panic!("test server on port {port} exited with error: {e}");
        }
    });
    wait_for_port(port).await;
}

async fn wait_for_port(port: u16) {
    for _ in 0..200 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server on port {port} never started accepting connections");
}

/// A single client connection, issuing commands and reading replies as
/// `RespFrame`s.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    pub async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("failed to connect to test server");
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn send(&mut self, parts: &[&str]) {
        let owned: Vec<Vec<u8>> = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
        let refs: Vec<&[u8]> = owned.iter().map(|v| v.as_slice()).collect();
        let frame = RespFrame::command(&refs);
        self.stream
            .write_all(&frame.encode_to_vec())
            .await
            .expect("failed to write command");
    }

    /// Reads exactly one reply frame, waiting up to five seconds for it.
    pub async fn read_reply(&mut self) -> RespFrame {
        timeout(Duration::from_secs(5), self.read_reply_inner())
            .await
            .expect("timed out waiting for a reply")
    }

    /// Like `read_reply`, but returns `None` on timeout instead of panicking
    /// — used to assert that a blocking command has *not* replied yet.
    pub async fn try_read_reply(&mut self, wait: Duration) -> Option<RespFrame> {
        timeout(wait, self.read_reply_inner()).await.ok()
    }

    async fn read_reply_inner(&mut self) -> RespFrame {
        loop {
            if let Some((frame, consumed)) =
                spineldb::core::protocol::resp_frame::try_parse(&self.buf)
                    .expect("server sent a malformed frame")
            {
                self.buf.drain(..consumed);
                return frame;
            }
            let mut chunk = [0u8; 4096];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .expect("connection closed while waiting for a reply");
            assert!(n > 0, "connection closed while waiting for a reply");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}
