// src/core/commands/mod.rs

//! Defines all supported commands and the central `Command` enum that
//! encapsulates their parsed state, plus parsing from raw command arguments.

use crate::core::commands::command_trait::CommandFlags;
use crate::core::errors::SpinelDBError;
use crate::core::storage::StreamIdSpec;
use bytes::Bytes;

pub mod command_trait;
pub mod generic;
pub mod replication;
pub mod streams;
pub mod string;
pub mod transaction;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),

    Set {
        key: Bytes,
        value: Bytes,
        px: Option<u64>,
    },
    Get(Bytes),
    Incr(Bytes),
    Type(Bytes),
    Keys(Bytes),

    ConfigGet(Bytes),
    Info(Option<Bytes>),

    XAdd {
        key: Bytes,
        id_spec: StreamIdSpec,
        fields: Vec<(Bytes, Bytes)>,
    },
    XRange {
        key: Bytes,
        start: Bytes,
        end: Bytes,
    },
    XRead {
        /// `None` = non-blocking. `Some(0)` = block indefinitely. `Some(n)` = timeout in ms.
        block_ms: Option<u64>,
        keys: Vec<Bytes>,
        ids: Vec<Bytes>,
    },

    Wait {
        num_replicas: i64,
        timeout_ms: i64,
    },

    Multi,
    Exec,
    Discard,

    Replconf(Vec<Bytes>),
    Psync {
        replid: Bytes,
        offset: i64,
    },
}

impl Command {
    /// Every propagated write command, per the replication contract: `SET`,
    /// `INCR`, and `XADD`. Everything else never reaches a replica's stream.
    pub fn flags(&self) -> CommandFlags {
        match self {
            Command::Set { .. } | Command::Incr(_) | Command::XAdd { .. } => CommandFlags::WRITE,
            Command::Get(_) | Command::Type(_) | Command::Keys(_) | Command::XRange { .. } => {
                CommandFlags::READONLY
            }
            Command::Multi | Command::Exec | Command::Discard => CommandFlags::TRANSACTION,
            _ => CommandFlags::ADMIN,
        }
    }

    pub fn is_write(&self) -> bool {
        self.flags().contains(CommandFlags::WRITE)
    }

    /// Parses a raw command (`name` plus the remaining bulk-string args) into
    /// a `Command`. `name` is matched case-insensitively per RESP convention.
    pub fn parse(name: &[u8], args: &[Bytes]) -> Result<Command, SpinelDBError> {
        let upper = name.to_ascii_uppercase();
        match upper.as_slice() {
            b"PING" => generic::parse_ping(args),
            b"ECHO" => generic::parse_echo(args),
            b"TYPE" => generic::parse_type(args),
            b"KEYS" => generic::parse_keys(args),
            b"CONFIG" => generic::parse_config(args),
            b"INFO" => generic::parse_info(args),

            b"SET" => string::parse_set(args),
            b"GET" => string::parse_get(args),
            b"INCR" => string::parse_incr(args),

            b"XADD" => streams::parse_xadd(args),
            b"XRANGE" => streams::parse_xrange(args),
            b"XREAD" => streams::parse_xread(args),

            b"WAIT" => replication::parse_wait(args),
            b"REPLCONF" => replication::parse_replconf(args),
            b"PSYNC" => replication::parse_psync(args),

            b"MULTI" => transaction::parse_multi(args),
            b"EXEC" => transaction::parse_exec(args),
            b"DISCARD" => transaction::parse_discard(args),

            _ => Err(SpinelDBError::UnknownCommand(
                String::from_utf8_lossy(name).into_owned(),
            )),
        }
    }
}

/// Shared arity-check helper: every arity error uses this exact wording.
pub(crate) fn wrong_arity(cmd_name: &str) -> SpinelDBError {
    SpinelDBError::WrongArgumentCount(cmd_name.to_string())
}
