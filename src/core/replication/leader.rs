// src/core/replication/leader.rs

//! Leader-side handshake helpers. There is no dedicated "leader service" task:
//! `PSYNC`/`REPLCONF` handshakes are replied to inline by the connection
//! handler for whichever client socket sends them, and the connection is then
//! promoted in place to a registered replica.

use crate::core::persistence::EMPTY_RDB_PAYLOAD;
use crate::core::protocol::RespFrame;
use bytes::Bytes;

/// The `+FULLRESYNC <replid> <offset>` reply. This server never performs
/// partial resync, so the offset in the reply is always 0 — the replica's
/// subsequent acknowledgements are relative to the leader's offset at the
/// moment of the handshake, which is captured separately by the caller.
pub fn fullresync_reply(replication_id: &str) -> RespFrame {
    RespFrame::SimpleString(format!("FULLRESYNC {replication_id} 0"))
}

/// The RDB wire frame sent immediately after `FULLRESYNC`: `$<len>\r\n<bytes>`
/// with **no** trailing CRLF, per the replication handshake framing.
pub fn rdb_wire_frame() -> Bytes {
    let mut out = Vec::with_capacity(EMPTY_RDB_PAYLOAD.len() + 16);
    out.push(b'$');
    out.extend_from_slice(EMPTY_RDB_PAYLOAD.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(EMPTY_RDB_PAYLOAD);
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdb_frame_has_no_trailing_crlf() {
        let frame = rdb_wire_frame();
        assert!(!frame.ends_with(b"\r\n"));
        assert!(frame.starts_with(b"$"));
    }
}
