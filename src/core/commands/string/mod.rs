// src/core/commands/string/mod.rs

//! SET, GET, INCR — the string-store commands.

use super::{Command, wrong_arity};
use crate::core::errors::SpinelDBError;
use crate::core::protocol::RespValue;
use crate::core::state::ServerState;
use crate::core::storage::string_store::deadline_from_millis;
use bytes::Bytes;

pub fn parse_set(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    if args.len() < 2 {
        return Err(wrong_arity("set"));
    }
    let key = args[0].clone();
    let value = args[1].clone();
    let mut px = None;
    let mut rest = &args[2..];
    while !rest.is_empty() {
        if rest[0].eq_ignore_ascii_case(b"PX") {
            let ms_str = rest.get(1).ok_or(SpinelDBError::SyntaxError)?;
            let ms: u64 = std::str::from_utf8(ms_str)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(SpinelDBError::NotAnInteger)?;
            px = Some(ms);
            rest = &rest[2..];
        } else {
            return Err(SpinelDBError::SyntaxError);
        }
    }
    Ok(Command::Set { key, value, px })
}

pub fn parse_get(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [key] => Ok(Command::Get(key.clone())),
        _ => Err(wrong_arity("get")),
    }
}

pub fn parse_incr(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [key] => Ok(Command::Incr(key.clone())),
        _ => Err(wrong_arity("incr")),
    }
}

/// Per the keyspace invariant (`SPEC_FULL.md` §3), a key lives in at most one
/// store; any string command reaching into a key already held as a stream
/// errors out rather than silently letting the key straddle both stores.
fn reject_if_stream(state: &ServerState, key: &Bytes) -> Result<(), SpinelDBError> {
    if state.stream_store.contains(key) {
        Err(SpinelDBError::WrongType)
    } else {
        Ok(())
    }
}

pub fn exec_set(
    state: &ServerState,
    key: &Bytes,
    value: &Bytes,
    px: Option<u64>,
) -> Result<RespValue, SpinelDBError> {
    reject_if_stream(state, key)?;
    match px {
        Some(ms) => state
            .string_store
            .set_px(key.clone(), value.clone(), deadline_from_millis(ms)),
        None => state.string_store.set(key.clone(), value.clone()),
    }
    Ok(RespValue::ok())
}

pub fn exec_get(state: &ServerState, key: &Bytes) -> Result<RespValue, SpinelDBError> {
    reject_if_stream(state, key)?;
    Ok(match state.string_store.get(key) {
        Some(value) => RespValue::BulkString(value),
        None => RespValue::Null,
    })
}

pub fn exec_incr(state: &ServerState, key: &Bytes) -> Result<i64, SpinelDBError> {
    reject_if_stream(state, key)?;
    state.string_store.incr(key)
}
