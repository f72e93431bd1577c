// src/core/dispatch.rs

//! The single place that turns a parsed `Command` into a reply. `MULTI`,
//! `EXEC`, `DISCARD`, `REPLCONF`, and `PSYNC` are not handled here: they
//! change per-connection state (the transaction queue, a connection's role)
//! that only the connection handler owns, so it matches those variants
//! itself and calls straight into the command modules' `exec_*` helpers.

use crate::core::Command;
use crate::core::commands::{generic, streams, string};
use crate::core::errors::SpinelDBError;
use crate::core::protocol::RespValue;
use crate::core::state::ServerState;

/// Executes any command that doesn't require per-connection state. Used both
/// by the client connection loop and by the replication follower, which
/// applies propagated writes locally and discards the reply.
pub async fn execute(state: &ServerState, cmd: &Command) -> Result<RespValue, SpinelDBError> {
    match cmd {
        Command::Ping(msg) => Ok(generic::exec_ping(msg)),
        Command::Echo(msg) => Ok(generic::exec_echo(msg)),

        Command::Set { key, value, px } => string::exec_set(state, key, value, *px),
        Command::Get(key) => string::exec_get(state, key),
        Command::Incr(key) => string::exec_incr(state, key).map(RespValue::Integer),
        Command::Type(key) => Ok(generic::exec_type(state, key)),
        Command::Keys(pattern) => generic::exec_keys(state, pattern),

        Command::ConfigGet(name) => Ok(generic::exec_config_get(state, name)),
        Command::Info(_) => Ok(generic::exec_info(state)),

        Command::XAdd {
            key,
            id_spec,
            fields,
        } => streams::exec_xadd(state, key, id_spec.clone(), fields),
        Command::XRange { key, start, end } => streams::exec_xrange(state, key, start, end),
        Command::XRead {
            block_ms,
            keys,
            ids,
        } => streams::exec_xread(state, *block_ms, keys, ids).await,

        Command::Wait {
            num_replicas,
            timeout_ms,
        } => {
            let acked = state.replication.wait(*num_replicas, *timeout_ms).await;
            Ok(RespValue::Integer(acked as i64))
        }

        Command::Multi | Command::Exec | Command::Discard => Err(SpinelDBError::InvalidState(
            "transaction commands must be handled by the connection".to_string(),
        )),
        Command::Replconf(_) | Command::Psync { .. } => Err(SpinelDBError::InvalidState(
            "replication handshake commands must be handled by the connection".to_string(),
        )),
    }
}
