// src/connection/handler.rs

//! Defines the `ConnectionHandler`, which manages the full lifecycle of a
//! client connection: frame decoding, the `MULTI`/`EXEC`/`DISCARD` queue, and
//! the one-way promotion to a replica connection after `PSYNC`.

use super::guard::ConnectionGuard;
use super::session::{ConnectionRole, SessionState};
use crate::core::commands::replication::{ReplconfKind, classify_replconf};
use crate::core::dispatch;
use crate::core::protocol::{RespFrame, RespValue, resp_frame};
use crate::core::replication::leader;
use crate::core::state::ServerState;
use crate::core::{Command, SpinelDBError};
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub struct ConnectionHandler {
    read_half: OwnedReadHalf,
    write_half: Option<OwnedWriteHalf>,
    buf: BytesMut,
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
    session: SessionState,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (read_half, write_half) = socket.into_split();
        Self {
            read_half,
            write_half: Some(write_half),
            buf: BytesMut::new(),
            addr,
            state,
            shutdown_rx,
            session: SessionState::new(),
        }
    }

    /// Runs the connection to completion. Ordinary clients execute commands
    /// directly; once `PSYNC` promotes the connection, the very same read
    /// loop continues, but only `REPLCONF ACK` frames mean anything to it —
    /// everything else is handled by the writer task spawned at promotion.
    pub async fn run(mut self) -> Result<(), SpinelDBError> {
        let mut guard = ConnectionGuard::new(self.state.clone(), self.addr);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    let _ = self.send_frame(RespFrame::Error("ERR server is shutting down".to_string())).await;
                    return Ok(());
                }
                frame_result = read_frame(&mut self.read_half, &mut self.buf) => {
                    match frame_result {
                        Ok(Some(frame)) => {
                            if let Err(e) = self.process_frame(frame, &mut guard).await {
                                let _ = self.send_frame(RespFrame::Error(e.to_string())).await;
                            }
                        }
                        Ok(None) => return Ok(()),
                        Err(e) => {
                            if !is_normal_disconnect(&e) {
                                warn!("connection error for {}: {e}", self.addr);
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn send_frame(&mut self, frame: RespFrame) -> Result<(), SpinelDBError> {
        if let Some(write_half) = self.write_half.as_mut() {
            write_half.write_all(&frame.encode_to_vec()).await?;
        }
        Ok(())
    }

    async fn process_frame(
        &mut self,
        frame: RespFrame,
        guard: &mut ConnectionGuard,
    ) -> Result<(), SpinelDBError> {
        let args = resp_frame::frame_as_command_args(frame)?;
        let Some((name, rest)) = args.split_first() else {
            return Ok(());
        };

        if self.session.role == ConnectionRole::Replica {
            // The only frame a promoted connection receives back is its own
            // acknowledgement of propagated bytes.
            if name.eq_ignore_ascii_case(b"REPLCONF")
                && let Ok(ReplconfKind::Ack(offset)) = classify_replconf(rest)
                && let Some(id) = guard.replica_id
            {
                self.state.replication.process_ack(id, offset);
            }
            return Ok(());
        }

        let command = Command::parse(name, rest)?;

        if self.session.in_transaction() {
            return self.process_in_transaction(command).await;
        }

        match command {
            Command::Multi => {
                self.session.begin_transaction();
                self.send_frame(RespFrame::from(RespValue::ok())).await
            }
            Command::Exec | Command::Discard => Err(SpinelDBError::InvalidState(
                "EXEC/DISCARD without MULTI".to_string(),
            )),
            Command::Replconf(args) => self.handle_replconf(&args, guard).await,
            Command::Psync { .. } => self.handle_psync(guard).await,
            other => {
                let is_write = other.is_write();
                let reply = dispatch::execute(&self.state, &other).await?;
                if is_write {
                    self.propagate(&other, &reply);
                }
                self.send_frame(RespFrame::from(reply)).await?;
                Ok(())
            }
        }
    }

    async fn process_in_transaction(&mut self, command: Command) -> Result<(), SpinelDBError> {
        match command {
            Command::Multi => Err(SpinelDBError::InvalidState(
                "MULTI calls can not be nested".to_string(),
            )),
            Command::Exec => {
                let queued = self.session.take_transaction();
                let mut replies = Vec::with_capacity(queued.len());
                for cmd in queued {
                    match dispatch::execute(&self.state, &cmd).await {
                        Ok(value) => {
                            if cmd.is_write() {
                                self.propagate(&cmd, &value);
                            }
                            replies.push(RespFrame::from(value));
                        }
                        Err(e) => replies.push(RespFrame::Error(e.to_string())),
                    }
                }
                self.send_frame(RespFrame::Array(replies)).await
            }
            Command::Discard => {
                self.session.take_transaction();
                self.send_frame(RespFrame::from(RespValue::ok())).await
            }
            other => {
                self.session.queue(other);
                self.send_frame(RespFrame::SimpleString("QUEUED".to_string()))
                    .await
            }
        }
    }

    async fn handle_replconf(
        &mut self,
        args: &[Bytes],
        guard: &mut ConnectionGuard,
    ) -> Result<(), SpinelDBError> {
        match classify_replconf(args)? {
            ReplconfKind::Ack(offset) => {
                if let Some(id) = guard.replica_id {
                    self.state.replication.process_ack(id, offset);
                }
                Ok(())
            }
            ReplconfKind::Handshake => self.send_frame(RespFrame::from(RespValue::ok())).await,
            ReplconfKind::GetAck => Ok(()),
        }
    }

    /// Re-encodes a write command for replication. `XADD`'s auto-generated ID
    /// is resolved to the concrete value from `reply` rather than replayed as
    /// `*`, so every replica stores exactly the same ID the leader did.
    fn propagate(&self, cmd: &Command, reply: &RespValue) {
        let parts = command_wire_parts(cmd, reply);
        if parts.is_empty() {
            return;
        }
        let refs: Vec<&[u8]> = parts.iter().map(|b| b.as_ref()).collect();
        let frame = RespFrame::command(&refs);
        self.state.replication.propagate(&frame);
    }

    async fn handle_psync(&mut self, guard: &mut ConnectionGuard) -> Result<(), SpinelDBError> {
        info!("promoting connection {} to replica", self.addr);
        self.send_frame(leader::fullresync_reply(&self.state.replication.replication_id))
            .await?;

        let rdb_frame = leader::rdb_wire_frame();
        let Some(write_half) = self.write_half.as_mut() else {
            return Err(SpinelDBError::Internal("connection already handed off".into()));
        };
        write_half.write_all(&rdb_frame).await?;
        write_half.flush().await?;

        self.session.role = ConnectionRole::Replica;
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let id = self.state.replication.register_replica(tx);
        guard.set_replica_id(id);

        let mut write_half = self.write_half.take().expect("checked above");
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }
}

/// Reads one full RESP frame, growing `buf` as needed. Returns `Ok(None)` on
/// a clean peer-initiated close with no partial frame pending.
async fn read_frame(
    read_half: &mut OwnedReadHalf,
    buf: &mut BytesMut,
) -> Result<Option<RespFrame>, SpinelDBError> {
    loop {
        if let Some((frame, consumed)) = resp_frame::try_parse(buf)? {
            buf.advance(consumed);
            return Ok(Some(frame));
        }
        let mut chunk = [0u8; 8192];
        let n = read_half.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn command_wire_parts(cmd: &Command, reply: &RespValue) -> Vec<Bytes> {
    match cmd {
        Command::Set { key, value, px } => {
            let mut parts = vec![Bytes::from_static(b"SET"), key.clone(), value.clone()];
            if let Some(ms) = px {
                parts.push(Bytes::from_static(b"PX"));
                parts.push(Bytes::from(ms.to_string()));
            }
            parts
        }
        Command::Incr(key) => vec![Bytes::from_static(b"INCR"), key.clone()],
        Command::XAdd { key, fields, .. } => {
            let resolved_id = match reply {
                RespValue::BulkString(id) => id.clone(),
                _ => return Vec::new(),
            };
            let mut parts = vec![Bytes::from_static(b"XADD"), key.clone(), resolved_id];
            for (f, v) in fields {
                parts.push(f.clone());
                parts.push(v.clone());
            }
            parts
        }
        _ => Vec::new(),
    }
}

fn is_normal_disconnect(e: &SpinelDBError) -> bool {
    matches!(e, SpinelDBError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
