// src/core/commands/generic.rs

//! PING, ECHO, TYPE, KEYS, CONFIG GET, INFO.

use super::{Command, wrong_arity};
use crate::core::errors::SpinelDBError;
use crate::core::protocol::RespValue;
use crate::core::state::ServerState;
use bytes::Bytes;

pub fn parse_ping(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args.len() {
        0 => Ok(Command::Ping(None)),
        1 => Ok(Command::Ping(Some(args[0].clone()))),
        _ => Err(wrong_arity("ping")),
    }
}

pub fn parse_echo(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [message] => Ok(Command::Echo(message.clone())),
        _ => Err(wrong_arity("echo")),
    }
}

pub fn parse_type(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [key] => Ok(Command::Type(key.clone())),
        _ => Err(wrong_arity("type")),
    }
}

pub fn parse_keys(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [pattern] => Ok(Command::Keys(pattern.clone())),
        _ => Err(wrong_arity("keys")),
    }
}

pub fn parse_config(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [sub, name] if sub.eq_ignore_ascii_case(b"GET") => Ok(Command::ConfigGet(name.clone())),
        _ => Err(SpinelDBError::SyntaxError),
    }
}

pub fn parse_info(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args.len() {
        0 => Ok(Command::Info(None)),
        1 => Ok(Command::Info(Some(args[0].clone()))),
        _ => Err(wrong_arity("info")),
    }
}

pub fn exec_ping(message: &Option<Bytes>) -> RespValue {
    match message {
        Some(msg) => RespValue::bulk(msg.clone()),
        None => RespValue::SimpleString("PONG".to_string()),
    }
}

pub fn exec_echo(message: &Bytes) -> RespValue {
    RespValue::bulk(message.clone())
}

/// Per the keyspace invariant, a key lives in at most one store, so the
/// check order only matters as a documented contract: stream first.
pub fn exec_type(state: &ServerState, key: &Bytes) -> RespValue {
    if state.stream_store.contains(key) {
        RespValue::SimpleString("stream".to_string())
    } else if state.string_store.contains(key) {
        RespValue::SimpleString("string".to_string())
    } else {
        RespValue::SimpleString("none".to_string())
    }
}

/// Only the literal pattern `"*"` is supported; anything else is a syntax error.
///
/// Lists string-store keys only, per `SPEC_FULL.md` §4.2's placement of
/// `keys_star` on the string store; stream keys are never returned here.
pub fn exec_keys(state: &ServerState, pattern: &Bytes) -> Result<RespValue, SpinelDBError> {
    if pattern.as_ref() != b"*" {
        return Err(SpinelDBError::InvalidRequest(
            "KEYS only supports the '*' pattern".to_string(),
        ));
    }
    let keys = state.string_store.keys();
    Ok(RespValue::Array(
        keys.into_iter().map(RespValue::bulk).collect(),
    ))
}

pub fn exec_config_get(state: &ServerState, name: &Bytes) -> RespValue {
    match state.config.config_get(name) {
        Some(value) => RespValue::Array(vec![
            RespValue::bulk(name.clone()),
            RespValue::bulk(Bytes::from(value)),
        ]),
        None => RespValue::Array(Vec::new()),
    }
}

pub fn exec_info(state: &ServerState) -> RespValue {
    let mut out = String::new();
    out.push_str("# Replication\r\n");
    match &state.config.replication {
        crate::config::ReplicationConfig::Leader => {
            out.push_str("role:master\r\n");
        }
        crate::config::ReplicationConfig::Follower { host, port } => {
            out.push_str("role:slave\r\n");
            out.push_str(&format!("master_host:{host}\r\n"));
            out.push_str(&format!("master_port:{port}\r\n"));
        }
    }
    out.push_str(&format!(
        "master_replid:{}\r\n",
        state.replication.replication_id
    ));
    out.push_str(&format!(
        "master_repl_offset:{}\r\n",
        state.replication.master_offset()
    ));
    RespValue::bulk(Bytes::from(out))
}
