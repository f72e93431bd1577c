// src/core/replication/follower.rs

//! The follower replication client: performs the leader handshake, ingests
//! the initial RDB snapshot, then continuously parses propagated commands
//! into the local stores while tracking the cumulative byte offset it has
//! processed, responding to `REPLCONF GETACK *` as required.

use crate::core::commands::replication::{ReplconfKind, classify_replconf};
use crate::core::errors::SpinelDBError;
use crate::core::persistence::RdbLoader;
use crate::core::protocol::{RespFrame, resp_frame};
use crate::core::state::ServerState;
use crate::core::{Command, dispatch};
use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

/// Reads a full RESP frame from the socket into `buf`, returning the frame
/// and advancing past its bytes. Used for both handshake replies and the
/// steady-state propagation loop — both are ordinary RESP values.
async fn read_frame(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<RespFrame, SpinelDBError> {
    loop {
        if let Some((frame, consumed)) = resp_frame::try_parse(buf)? {
            buf.advance(consumed);
            return Ok(frame);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(SpinelDBError::ReplicationError(
                "leader closed connection during handshake".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Reads the `$<len>\r\n<bytes>` RDB frame. Unlike a normal bulk string, this
/// framing has **no** trailing CRLF after the payload.
async fn read_rdb_frame(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<Vec<u8>, SpinelDBError> {
    // Read the `$<len>\r\n` header line.
    loop {
        if let Some(pos) = find_crlf(buf) {
            if buf[0] != b'$' {
                return Err(SpinelDBError::Protocol("expected RDB bulk frame".into()));
            }
            let len: usize = std::str::from_utf8(&buf[1..pos])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| SpinelDBError::Protocol("invalid RDB length".into()))?;
            let header_len = pos + 2;
            while buf.len() < header_len + len {
                let mut chunk = [0u8; 8192];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(SpinelDBError::ReplicationError(
                        "leader closed connection while sending RDB".to_string(),
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let payload = buf[header_len..header_len + len].to_vec();
            buf.advance(header_len + len);
            return Ok(payload);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(SpinelDBError::ReplicationError(
                "leader closed connection during RDB handshake".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

async fn send_command(stream: &mut TcpStream, parts: &[&[u8]]) -> Result<(), SpinelDBError> {
    let encoded = RespFrame::command(parts).encode_to_vec();
    stream.write_all(&encoded).await?;
    Ok(())
}

fn expect_simple(frame: &RespFrame, prefix: &str) -> Result<(), SpinelDBError> {
    match frame {
        RespFrame::SimpleString(s) if s.to_ascii_uppercase().starts_with(prefix) => Ok(()),
        other => Err(SpinelDBError::ReplicationError(format!(
            "expected {prefix}..., got {other:?}"
        ))),
    }
}

/// Runs the follower replication client for the lifetime of the process. On
/// any I/O error the task terminates; reconnection is not implemented.
pub async fn run(state: Arc<ServerState>, host: String, port: u16, own_port: u16) {
    if let Err(e) = run_inner(state, host.clone(), port, own_port).await {
        error!("replication worker against {host}:{port} terminated: {e}");
    }
}

async fn run_inner(
    state: Arc<ServerState>,
    host: String,
    port: u16,
    own_port: u16,
) -> Result<(), SpinelDBError> {
    let mut stream = TcpStream::connect((host.as_str(), port)).await?;
    let mut buf = BytesMut::new();

    send_command(&mut stream, &[b"PING"]).await?;
    expect_simple(&read_frame(&mut stream, &mut buf).await?, "PONG")?;

    let own_port_str = own_port.to_string();
    send_command(
        &mut stream,
        &[b"REPLCONF", b"listening-port", own_port_str.as_bytes()],
    )
    .await?;
    expect_simple(&read_frame(&mut stream, &mut buf).await?, "OK")?;

    send_command(&mut stream, &[b"REPLCONF", b"capa", b"psync2"]).await?;
    expect_simple(&read_frame(&mut stream, &mut buf).await?, "OK")?;

    send_command(&mut stream, &[b"PSYNC", b"?", b"-1"]).await?;
    expect_simple(&read_frame(&mut stream, &mut buf).await?, "FULLRESYNC")?;

    let rdb_bytes = read_rdb_frame(&mut stream, &mut buf).await?;
    let loaded = RdbLoader::load_from_bytes(&rdb_bytes);
    for entry in loaded {
        state
            .string_store
            .load(entry.key, entry.value, entry.expires_at);
    }
    info!("initial sync with {host}:{port} complete, entering propagation loop");

    let mut processed_offset: u64 = 0;
    loop {
        let (frame, consumed) = loop {
            if let Some((frame, consumed)) = resp_frame::try_parse(&buf)? {
                break (frame, consumed);
            }
            let mut chunk = [0u8; 8192];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(SpinelDBError::ReplicationError(
                    "leader closed the replication stream".to_string(),
                ));
            }
            buf.extend_from_slice(&chunk[..n]);
        };
        buf.advance(consumed);

        let args = resp_frame::frame_as_command_args(frame)?;
        if args.is_empty() {
            continue;
        }
        let name = args[0].clone();
        let rest = &args[1..];

        if name.eq_ignore_ascii_case(b"REPLCONF") {
            match classify_replconf(rest) {
                Ok(ReplconfKind::GetAck) => {
                    let offset_str = processed_offset.to_string();
                    send_command(&mut stream, &[b"REPLCONF", b"ACK", offset_str.as_bytes()])
                        .await?;
                }
                _ => {}
            }
            processed_offset += consumed as u64;
            continue;
        }

        match Command::parse(&name, rest) {
            Ok(cmd) => {
                let _ = dispatch::execute(&state, &cmd).await;
            }
            Err(e) => {
                warn!("ignoring unparseable propagated command: {e}");
            }
        }
        processed_offset += consumed as u64;
    }
}
