// src/core/commands/streams/mod.rs

//! XADD, XRANGE, XREAD — the stream-store commands.

use super::{Command, wrong_arity};
use crate::core::errors::SpinelDBError;
use crate::core::protocol::RespValue;
use crate::core::state::ServerState;
use crate::core::storage::{StreamEntry, StreamId, StreamIdSpec};
use bytes::Bytes;
use std::time::Duration;

/// A duration far enough out that `Instant::now() + FAR_FUTURE` never
/// overflows on any supported platform, used as the saturating fallback for
/// an absurdly large `BLOCK` millisecond count instead of panicking.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub fn parse_xadd(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    if args.len() < 3 {
        return Err(wrong_arity("xadd"));
    }
    let key = args[0].clone();
    let id_spec = StreamIdSpec::parse(std::str::from_utf8(&args[1]).map_err(|_| {
        SpinelDBError::InvalidRequest("invalid stream ID".to_string())
    })?)?;
    let field_args = &args[2..];
    if field_args.is_empty() || field_args.len() % 2 != 0 {
        return Err(SpinelDBError::WrongArgumentCount("xadd".to_string()));
    }
    let fields = field_args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok(Command::XAdd {
        key,
        id_spec,
        fields,
    })
}

pub fn parse_xrange(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    match args {
        [key, start, end] => Ok(Command::XRange {
            key: key.clone(),
            start: start.clone(),
            end: end.clone(),
        }),
        _ => Err(wrong_arity("xrange")),
    }
}

pub fn parse_xread(args: &[Bytes]) -> Result<Command, SpinelDBError> {
    let mut block_ms = None;
    let mut idx = 0;
    if idx < args.len() && args[idx].eq_ignore_ascii_case(b"BLOCK") {
        let ms_str = args.get(idx + 1).ok_or(SpinelDBError::SyntaxError)?;
        let ms: u64 = std::str::from_utf8(ms_str)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(SpinelDBError::NotAnInteger)?;
        block_ms = Some(ms);
        idx += 2;
    }
    if idx >= args.len() || !args[idx].eq_ignore_ascii_case(b"STREAMS") {
        return Err(SpinelDBError::SyntaxError);
    }
    idx += 1;
    let remaining = &args[idx..];
    if remaining.is_empty() || remaining.len() % 2 != 0 {
        return Err(SpinelDBError::SyntaxError);
    }
    let n = remaining.len() / 2;
    let keys = remaining[..n].to_vec();
    let ids = remaining[n..].to_vec();
    Ok(Command::XRead {
        block_ms,
        keys,
        ids,
    })
}

/// Resolves an `XRANGE`/`XREVRANGE` bound: `-`, `+`, `<t>`, or `<t>-<s>`. A
/// bound lacking a sequence defaults seq=0 for a start, seq=MAX for an end.
fn parse_range_bound(raw: &[u8], is_start: bool) -> Result<StreamId, SpinelDBError> {
    if raw == b"-" {
        return Ok(StreamId::MIN);
    }
    if raw == b"+" {
        return Ok(StreamId::MAX);
    }
    let s = std::str::from_utf8(raw)
        .map_err(|_| SpinelDBError::InvalidRequest("invalid stream ID".to_string()))?;
    if let Some((ms_part, seq_part)) = s.split_once('-') {
        let timestamp_ms: u64 = ms_part
            .parse()
            .map_err(|_| SpinelDBError::InvalidRequest("invalid stream ID".to_string()))?;
        let sequence: u64 = seq_part
            .parse()
            .map_err(|_| SpinelDBError::InvalidRequest("invalid stream ID".to_string()))?;
        Ok(StreamId::new(timestamp_ms, sequence))
    } else {
        let timestamp_ms: u64 = s
            .parse()
            .map_err(|_| SpinelDBError::InvalidRequest("invalid stream ID".to_string()))?;
        let sequence = if is_start { 0 } else { u64::MAX };
        Ok(StreamId::new(timestamp_ms, sequence))
    }
}

/// Resolves an `XREAD` per-key starting ID: a fully-specified ID, or `$`
/// (the current top-of-stream, snapshotted by the caller before any wait).
fn parse_xread_id(raw: &[u8], current_last: StreamId) -> Result<StreamId, SpinelDBError> {
    if raw == b"$" {
        return Ok(current_last);
    }
    let s = std::str::from_utf8(raw)
        .map_err(|_| SpinelDBError::InvalidRequest("invalid stream ID".to_string()))?;
    s.parse()
}

/// Per the keyspace invariant (`SPEC_FULL.md` §3), a key lives in at most one
/// store; any stream command reaching into a key already held as a string
/// errors out rather than silently letting the key straddle both stores.
fn reject_if_string(state: &ServerState, key: &Bytes) -> Result<(), SpinelDBError> {
    if state.string_store.contains(key) {
        Err(SpinelDBError::WrongType)
    } else {
        Ok(())
    }
}

pub fn exec_xadd(
    state: &ServerState,
    key: &Bytes,
    id_spec: StreamIdSpec,
    fields: &[(Bytes, Bytes)],
) -> Result<RespValue, SpinelDBError> {
    reject_if_string(state, key)?;
    let id = state
        .stream_store
        .add_entry(key, id_spec, fields.to_vec())?;
    Ok(RespValue::bulk(Bytes::from(id.to_string())))
}

fn render_entries(entries: Vec<StreamEntry>) -> RespValue {
    RespValue::Array(
        entries
            .into_iter()
            .map(|entry| {
                let field_values = entry
                    .fields
                    .into_iter()
                    .flat_map(|(f, v)| [RespValue::bulk(f), RespValue::bulk(v)])
                    .collect();
                RespValue::Array(vec![
                    RespValue::bulk(Bytes::from(entry.id.to_string())),
                    RespValue::Array(field_values),
                ])
            })
            .collect(),
    )
}

pub fn exec_xrange(
    state: &ServerState,
    key: &Bytes,
    start: &[u8],
    end: &[u8],
) -> Result<RespValue, SpinelDBError> {
    reject_if_string(state, key)?;
    let start_id = parse_range_bound(start, true)?;
    let end_id = parse_range_bound(end, false)?;
    let entries = state.stream_store.range(key, start_id, end_id);
    Ok(render_entries(entries))
}

/// Executes `XREAD`, blocking as requested. `$` bounds are resolved against
/// each key's current top-of-stream before the first (non-blocking) poll, so
/// the "new entries only" horizon is fixed at call time.
pub async fn exec_xread(
    state: &ServerState,
    block_ms: Option<u64>,
    keys: &[Bytes],
    ids: &[Bytes],
) -> Result<RespValue, SpinelDBError> {
    for key in keys {
        reject_if_string(state, key)?;
    }

    let watches: Vec<(Bytes, StreamId)> = keys
        .iter()
        .zip(ids.iter())
        .map(|(key, id_raw)| {
            let current_last = state.stream_store.last_id(key);
            let after_id = parse_xread_id(id_raw, current_last)?;
            Ok((key.clone(), after_id))
        })
        .collect::<Result<_, SpinelDBError>>()?;

    let deadline = block_ms.and_then(|ms| {
        if ms == 0 {
            None // block indefinitely
        } else {
            let now = std::time::Instant::now();
            Some(
                now.checked_add(Duration::from_millis(ms))
                    .unwrap_or_else(|| now + FAR_FUTURE),
            )
        }
    });
    let blocking = block_ms.is_some();

    loop {
        // Pin and enable the waiter *before* checking current state: a
        // `Notified` only joins `Notify`'s waiter list once it is polled or
        // `enable()`d, so enabling after `collect_after` would leave a
        // window in which a concurrent `XADD`'s `notify_waiters()` is
        // silently missed.
        let notified = state.stream_store.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let collected = state.stream_store.collect_after(&watches);
        if !collected.is_empty() {
            return Ok(RespValue::Array(
                collected
                    .into_iter()
                    .map(|(key, entries)| {
                        RespValue::Array(vec![RespValue::bulk(key), render_entries(entries)])
                    })
                    .collect(),
            ));
        }
        if !blocking {
            return Ok(RespValue::NullArray);
        }
        let remaining = deadline.map(|d| d.saturating_duration_since(std::time::Instant::now()));
        if let Some(r) = remaining {
            if r.is_zero() {
                return Ok(RespValue::NullArray);
            }
        }
        let woke = state
            .stream_store
            .wait_for_append(notified.as_mut(), remaining)
            .await;
        if !woke && deadline.is_some() {
            return Ok(RespValue::NullArray);
        }
        // Either woken by an append or (indefinite block) spuriously -- re-check.
    }
}
