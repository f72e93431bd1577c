// src/core/storage/stream.rs

use crate::core::errors::SpinelDBError;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stream entry identifier: total order is lexicographic on `(timestamp_ms, sequence)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub timestamp_ms: u64,
    pub sequence: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId {
        timestamp_ms: 0,
        sequence: 0,
    };
    pub const MAX: StreamId = StreamId {
        timestamp_ms: u64::MAX,
        sequence: u64::MAX,
    };

    pub fn new(timestamp_ms: u64, sequence: u64) -> Self {
        Self {
            timestamp_ms,
            sequence,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp_ms, self.sequence)
    }
}

impl FromStr for StreamId {
    type Err = SpinelDBError;

    /// Parses a fully-specified ID (`"0"`, `"<t>"`, or `"<t>-<s>"`). Does not
    /// understand the `*`/`-`/`+` sentinels; those are resolved by the caller
    /// depending on context (XADD id-spec vs. XRANGE bound).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '-');
        let ms_part = parts.next().unwrap_or("");
        let timestamp_ms: u64 = ms_part
            .parse()
            .map_err(|_| SpinelDBError::Protocol("invalid stream ID".into()))?;
        let sequence = match parts.next() {
            Some(seq_part) => seq_part
                .parse()
                .map_err(|_| SpinelDBError::Protocol("invalid stream ID".into()))?,
            None => 0,
        };
        Ok(StreamId::new(timestamp_ms, sequence))
    }
}

/// How the sequence/timestamp portion of an `XADD` ID argument should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamIdSpec {
    /// `*` — timestamp and sequence are both auto-generated.
    Auto,
    /// `<t>-*` — timestamp fixed, sequence auto-generated.
    AutoSequence(u64),
    /// `<t>-<s>` — both components given explicitly.
    Exact(StreamId),
}

impl StreamIdSpec {
    pub fn parse(s: &str) -> Result<Self, SpinelDBError> {
        if s == "*" {
            return Ok(StreamIdSpec::Auto);
        }
        if let Some(ms_part) = s.strip_suffix("-*") {
            let timestamp_ms: u64 = ms_part
                .parse()
                .map_err(|_| SpinelDBError::Protocol("invalid stream ID".into()))?;
            return Ok(StreamIdSpec::AutoSequence(timestamp_ms));
        }
        Ok(StreamIdSpec::Exact(s.parse()?))
    }
}

/// A single appended record: an ID plus a flat, even-length sequence of
/// field/value bytes. Pairing is positional, not a lookup map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// An append-only, strictly id-increasing log of entries for one key.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    pub entries: BTreeMap<StreamId, StreamEntry>,
    pub last_generated_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }

    /// Resolves `id_spec` against the current top-of-stream id and, on
    /// success, appends the entry and advances `last_generated_id`.
    pub fn add_entry(
        &mut self,
        id_spec: StreamIdSpec,
        fields: Vec<(Bytes, Bytes)>,
    ) -> Result<StreamId, SpinelDBError> {
        let new_id = match id_spec {
            StreamIdSpec::Auto => {
                let mut timestamp_ms = Self::now_ms();
                if timestamp_ms < self.last_generated_id.timestamp_ms {
                    timestamp_ms = self.last_generated_id.timestamp_ms;
                }
                let sequence = if timestamp_ms == self.last_generated_id.timestamp_ms {
                    self.last_generated_id.sequence + 1
                } else {
                    0
                };
                StreamId::new(timestamp_ms, sequence)
            }
            StreamIdSpec::AutoSequence(timestamp_ms) => {
                // When `timestamp_ms` matches the stream's default (0,0) top-of-stream
                // (i.e. the stream is empty), this naturally yields sequence 1, giving
                // the "0-* starts at 0-1" behavior without a separate special case.
                let sequence = if timestamp_ms == self.last_generated_id.timestamp_ms {
                    self.last_generated_id.sequence + 1
                } else {
                    0
                };
                let candidate = StreamId::new(timestamp_ms, sequence);
                if candidate <= self.last_generated_id {
                    return Err(SpinelDBError::InvalidRequest(
                        "The ID specified in XADD is equal or smaller than the target stream top item"
                            .into(),
                    ));
                }
                candidate
            }
            StreamIdSpec::Exact(id) => {
                if id == StreamId::MIN {
                    return Err(SpinelDBError::InvalidRequest(
                        "The ID specified in XADD must be greater than 0-0".into(),
                    ));
                }
                if id <= self.last_generated_id {
                    return Err(SpinelDBError::InvalidRequest(
                        "The ID specified in XADD is equal or smaller than the target stream top item"
                            .into(),
                    ));
                }
                id
            }
        };

        self.entries.insert(new_id, StreamEntry { id: new_id, fields });
        self.last_generated_id = new_id;
        Ok(new_id)
    }

    /// Entries with `start <= id <= end`, in ascending order.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<&StreamEntry> {
        self.entries.range(start..=end).map(|(_, e)| e).collect()
    }

    /// Entries strictly greater than `after`, in ascending order.
    pub fn after(&self, after: StreamId) -> Vec<&StreamEntry> {
        if after == StreamId::MAX {
            return Vec::new();
        }
        let lower = StreamId::new(after.timestamp_ms, after.sequence.saturating_add(1));
        self.entries.range(lower..).map(|(_, e)| e).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
        pairs
            .iter()
            .map(|(k, v)| (Bytes::copy_from_slice(k.as_bytes()), Bytes::copy_from_slice(v.as_bytes())))
            .collect()
    }

    #[test]
    fn exact_ids_must_be_strictly_increasing() {
        let mut s = Stream::new();
        let id1 = s
            .add_entry(StreamIdSpec::Exact(StreamId::new(1, 1)), fields(&[("a", "b")]))
            .unwrap();
        assert_eq!(id1, StreamId::new(1, 1));

        let err = s
            .add_entry(StreamIdSpec::Exact(StreamId::new(1, 1)), fields(&[("c", "d")]))
            .unwrap_err();
        assert!(format!("{err}").contains("equal or smaller"));

        let id2 = s
            .add_entry(StreamIdSpec::Exact(StreamId::new(1, 2)), fields(&[("c", "d")]))
            .unwrap();
        assert_eq!(id2, StreamId::new(1, 2));
    }

    #[test]
    fn zero_zero_is_rejected() {
        let mut s = Stream::new();
        let err = s
            .add_entry(StreamIdSpec::Exact(StreamId::MIN), fields(&[]))
            .unwrap_err();
        assert!(format!("{err}").contains("greater than 0-0"));
    }

    #[test]
    fn auto_sequence_increments_within_same_timestamp() {
        let mut s = Stream::new();
        let id1 = s
            .add_entry(StreamIdSpec::AutoSequence(5), fields(&[]))
            .unwrap();
        assert_eq!(id1, StreamId::new(5, 0));
        let id2 = s
            .add_entry(StreamIdSpec::AutoSequence(5), fields(&[]))
            .unwrap();
        assert_eq!(id2, StreamId::new(5, 1));
    }

    #[test]
    fn range_and_after_are_inclusive_and_exclusive_respectively() {
        let mut s = Stream::new();
        s.add_entry(StreamIdSpec::Exact(StreamId::new(1, 0)), fields(&[]))
            .unwrap();
        s.add_entry(StreamIdSpec::Exact(StreamId::new(2, 0)), fields(&[]))
            .unwrap();
        s.add_entry(StreamIdSpec::Exact(StreamId::new(3, 0)), fields(&[]))
            .unwrap();

        assert_eq!(s.range(StreamId::MIN, StreamId::MAX).len(), 3);
        assert_eq!(s.after(StreamId::new(1, 0)).len(), 2);
        assert_eq!(s.after(StreamId::MAX).len(), 0);
    }
}
