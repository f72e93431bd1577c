// src/core/commands/transaction/mod.rs

//! MULTI, EXEC, DISCARD — parsing only. The queueing state machine lives in
//! the connection handler, since it spans multiple commands on one socket.

use super::{Command, wrong_arity};
use crate::core::errors::SpinelDBError;
use bytes::Bytes;

pub fn parse_multi(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    if args.is_empty() {
        Ok(Command::Multi)
    } else {
        Err(wrong_arity("multi"))
    }
}

pub fn parse_exec(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    if args.is_empty() {
        Ok(Command::Exec)
    } else {
        Err(wrong_arity("exec"))
    }
}

pub fn parse_discard(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    if args.is_empty() {
        Ok(Command::Discard)
    } else {
        Err(wrong_arity("discard"))
    }
}
