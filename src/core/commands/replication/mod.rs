// src/core/commands/replication/mod.rs

//! WAIT, REPLCONF, PSYNC — parsing only. Execution is threaded through the
//! connection handler and `ReplicationState` directly, since both commands
//! mutate per-connection role (`PSYNC`) or reach across connections
//! (`REPLCONF ACK`, `WAIT`).

use super::{Command, wrong_arity};
use crate::core::errors::SpinelDBError;
use bytes::Bytes;

pub fn parse_wait(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [num, timeout] => {
            let num_replicas = parse_i64(num)?;
            let timeout_ms = parse_i64(timeout)?;
            Ok(Command::Wait {
                num_replicas,
                timeout_ms,
            })
        }
        _ => Err(wrong_arity("wait")),
    }
}

pub fn parse_replconf(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    Ok(Command::Replconf(args.to_vec()))
}

pub fn parse_psync(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [replid, offset] => Ok(Command::Psync {
            replid: replid.clone(),
            offset: parse_i64(offset)?,
        }),
        _ => Err(wrong_arity("psync")),
    }
}

fn parse_i64(raw: &[u8]) -> Result<i64, SpinelDBError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(SpinelDBError::NotAnInteger)
}

/// The subcommand shape of a parsed `REPLCONF`, resolved by the connection
/// handler (it alone knows whether this socket is a registered replica).
#[derive(Debug, Clone, PartialEq)]
pub enum ReplconfKind {
    /// `REPLCONF listening-port <n>` / `REPLCONF capa ...` — handshake noise; reply `+OK`.
    Handshake,
    /// `REPLCONF ACK <offset>` — sent by a replica to its leader; no reply.
    Ack(u64),
    /// `REPLCONF GETACK *` — sent by a leader to a replica; replies `REPLCONF ACK <n>`.
    GetAck,
}

pub fn classify_replconf(args: &[Bytes]) -> Result<ReplconfKind, SpinelDBError> {
    match args {
        [sub, value] if sub.eq_ignore_ascii_case(b"ACK") => {
            let offset = parse_i64(value)?.max(0) as u64;
            Ok(ReplconfKind::Ack(offset))
        }
        [sub, star] if sub.eq_ignore_ascii_case(b"GETACK") && star.as_ref() == b"*" => {
            Ok(ReplconfKind::GetAck)
        }
        [_, _] => Ok(ReplconfKind::Handshake),
        _ => Err(SpinelDBError::SyntaxError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ack_and_getack() {
        assert_eq!(
            classify_replconf(&[Bytes::from_static(b"ACK"), Bytes::from_static(b"42")]).unwrap(),
            ReplconfKind::Ack(42)
        );
        assert_eq!(
            classify_replconf(&[Bytes::from_static(b"GETACK"), Bytes::from_static(b"*")]).unwrap(),
            ReplconfKind::GetAck
        );
        assert_eq!(
            classify_replconf(&[
                Bytes::from_static(b"listening-port"),
                Bytes::from_static(b"6380")
            ])
            .unwrap(),
            ReplconfKind::Handshake
        );
    }
}
