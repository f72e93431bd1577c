// src/core/protocol/resp_frame.rs

//! The RESP2 wire codec: byte-accurate framing and encoding.
//!
//! Only RESP2 is implemented (simple strings, errors, integers, bulk strings,
//! arrays). Framing is byte-based rather than line-based: bulk string payloads
//! are bounded by their length prefix and may contain embedded CR/LF, so a
//! frame can never be recognised by scanning for a terminating newline alone.

use crate::core::errors::SpinelDBError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const MAX_INLINE_LEN: u64 = 64 * 1024;
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// A single RESP value, used both for parsed input frames and for values about
/// to be serialised onto the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Array(Vec<RespFrame>),
    /// `$-1\r\n`
    Null,
    /// `*-1\r\n`
    NullArray,
}

impl RespFrame {
    /// Builds a client-style command frame: `*N\r\n$len\r\n<arg>\r\n...`.
    pub fn command(parts: &[&[u8]]) -> Self {
        RespFrame::Array(
            parts
                .iter()
                .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p)))
                .collect(),
        )
    }

    /// Renders this frame to its RESP wire bytes.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_into(self, &mut buf);
        buf
    }
}

fn encode_into(frame: &RespFrame, buf: &mut Vec<u8>) {
    match frame {
        RespFrame::SimpleString(s) => {
            buf.push(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(CRLF);
        }
        RespFrame::Error(s) => {
            buf.push(b'-');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(CRLF);
        }
        RespFrame::Integer(i) => {
            buf.push(b':');
            buf.extend_from_slice(i.to_string().as_bytes());
            buf.extend_from_slice(CRLF);
        }
        RespFrame::BulkString(b) => {
            buf.push(b'$');
            buf.extend_from_slice(b.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(b);
            buf.extend_from_slice(CRLF);
        }
        RespFrame::Null => {
            buf.extend_from_slice(b"$-1\r\n");
        }
        RespFrame::NullArray => {
            buf.extend_from_slice(b"*-1\r\n");
        }
        RespFrame::Array(items) => {
            buf.push(b'*');
            buf.extend_from_slice(items.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            for item in items {
                encode_into(item, buf);
            }
        }
    }
}

/// Finds the index of the next `\r\n` in `buf`, starting at `from`.
fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == CRLF)
        .map(|p| p + from)
}

/// Reads one CRLF-terminated line starting at `pos`, returning the line
/// (without the terminator) and the offset just past the terminator.
fn read_line(buf: &[u8], pos: usize) -> Result<Option<(&[u8], usize)>, SpinelDBError> {
    match find_crlf(buf, pos) {
        Some(end) => {
            if (end - pos) as u64 > MAX_INLINE_LEN {
                return Err(SpinelDBError::Protocol("line too long".into()));
            }
            Ok(Some((&buf[pos..end], end + 2)))
        }
        None => Ok(None),
    }
}

fn parse_i64(bytes: &[u8]) -> Result<i64, SpinelDBError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| SpinelDBError::Protocol("invalid integer".into()))
}

/// Attempts to parse exactly one RESP frame out of `buf`, starting at offset 0.
///
/// Returns `Ok(None)` if `buf` does not yet contain a full frame (caller should
/// wait for more bytes). On success, returns the parsed frame together with
/// the number of bytes it occupied in `buf` — the caller is responsible for
/// advancing/consuming that many bytes. This function never mutates `buf`.
pub fn try_parse(buf: &[u8]) -> Result<Option<(RespFrame, usize)>, SpinelDBError> {
    if buf.is_empty() {
        return Ok(None);
    }
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], pos: usize) -> Result<Option<(RespFrame, usize)>, SpinelDBError> {
    if pos >= buf.len() {
        return Ok(None);
    }
    let prefix = buf[pos];
    let body_start = pos + 1;
    match prefix {
        b'+' => match read_line(buf, body_start)? {
            Some((line, end)) => Ok(Some((
                RespFrame::SimpleString(String::from_utf8_lossy(line).into_owned()),
                end,
            ))),
            None => Ok(None),
        },
        b'-' => match read_line(buf, body_start)? {
            Some((line, end)) => Ok(Some((
                RespFrame::Error(String::from_utf8_lossy(line).into_owned()),
                end,
            ))),
            None => Ok(None),
        },
        b':' => match read_line(buf, body_start)? {
            Some((line, end)) => Ok(Some((RespFrame::Integer(parse_i64(line)?), end))),
            None => Ok(None),
        },
        b'$' => parse_bulk_string(buf, body_start),
        b'*' => parse_array(buf, body_start),
        _ => Err(SpinelDBError::Protocol(format!(
            "invalid frame type byte '{}'",
            prefix as char
        ))),
    }
}

fn parse_bulk_string(buf: &[u8], pos: usize) -> Result<Option<(RespFrame, usize)>, SpinelDBError> {
    let (len_line, after_len) = match read_line(buf, pos)? {
        Some(v) => v,
        None => return Ok(None),
    };
    let len = parse_i64(len_line)?;
    if len == -1 {
        return Ok(Some((RespFrame::Null, after_len)));
    }
    if !(0..=MAX_BULK_LEN).contains(&len) {
        return Err(SpinelDBError::Protocol("invalid bulk string length".into()));
    }
    let len = len as usize;
    let data_end = after_len + len;
    let term_end = data_end + 2;
    if buf.len() < term_end {
        return Ok(None);
    }
    if &buf[data_end..term_end] != CRLF {
        return Err(SpinelDBError::Protocol(
            "bulk string missing terminating CRLF".into(),
        ));
    }
    let bytes = Bytes::copy_from_slice(&buf[after_len..data_end]);
    Ok(Some((RespFrame::BulkString(bytes), term_end)))
}

fn parse_array(buf: &[u8], pos: usize) -> Result<Option<(RespFrame, usize)>, SpinelDBError> {
    let (len_line, mut cursor) = match read_line(buf, pos)? {
        Some(v) => v,
        None => return Ok(None),
    };
    let count = parse_i64(len_line)?;
    if count == -1 {
        return Ok(Some((RespFrame::NullArray, cursor)));
    }
    if !(0..=MAX_ARRAY_LEN).contains(&count) {
        return Err(SpinelDBError::Protocol("invalid array length".into()));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match parse_value(buf, cursor)? {
            Some((item, end)) => {
                cursor = end;
                items.push(item);
            }
            None => return Ok(None),
        }
    }
    Ok(Some((RespFrame::Array(items), cursor)))
}

/// Parses a client command frame (`*N\r\n$..\r\n...`) into its bulk-string
/// arguments. Any other well-formed frame shape is a protocol error at the
/// command layer.
pub fn frame_as_command_args(frame: RespFrame) -> Result<Vec<Bytes>, SpinelDBError> {
    match frame {
        RespFrame::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespFrame::BulkString(b) => Ok(b),
                _ => Err(SpinelDBError::Protocol(
                    "expected bulk string array element".into(),
                )),
            })
            .collect(),
        _ => Err(SpinelDBError::Protocol(
            "expected array of bulk strings".into(),
        )),
    }
}

/// A `tokio_util` codec wrapping [`try_parse`]/encoding for use with `Framed`.
#[derive(Debug, Default)]
pub struct RespFrameCodec;

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = SpinelDBError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match try_parse(src)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = SpinelDBError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buf = Vec::new();
        encode_into(&item, &mut buf);
        dst.put_slice(&buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_string() {
        let (frame, n) = try_parse(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(frame, RespFrame::SimpleString("OK".into()));
        assert_eq!(n, 5);
    }

    #[test]
    fn parses_bulk_string_with_embedded_crlf() {
        let input = b"$6\r\nfo\r\nbr\r\n";
        let (frame, n) = try_parse(input).unwrap().unwrap();
        assert_eq!(
            frame,
            RespFrame::BulkString(Bytes::from_static(b"fo\r\nbr"))
        );
        assert_eq!(n, input.len());
    }

    #[test]
    fn parses_null_bulk_and_null_array() {
        assert_eq!(try_parse(b"$-1\r\n").unwrap().unwrap().0, RespFrame::Null);
        assert_eq!(
            try_parse(b"*-1\r\n").unwrap().unwrap().0,
            RespFrame::NullArray
        );
    }

    #[test]
    fn incomplete_frame_returns_none() {
        assert_eq!(try_parse(b"*2\r\n$3\r\nfoo\r\n").unwrap(), None);
        assert_eq!(try_parse(b"").unwrap(), None);
    }

    #[test]
    fn parses_command_array() {
        let input = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let (frame, n) = try_parse(input).unwrap().unwrap();
        assert_eq!(n, input.len());
        let args = frame_as_command_args(frame).unwrap();
        assert_eq!(
            args,
            vec![
                Bytes::from_static(b"SET"),
                Bytes::from_static(b"foo"),
                Bytes::from_static(b"bar"),
            ]
        );
    }

    #[test]
    fn malformed_prefix_is_protocol_error() {
        assert!(try_parse(b"!oops\r\n").is_err());
    }

    #[test]
    fn roundtrip_encode_decode() {
        let values = vec![
            RespFrame::SimpleString("PONG".into()),
            RespFrame::Error("ERR boom".into()),
            RespFrame::Integer(-42),
            RespFrame::BulkString(Bytes::from_static(b"hello\r\nworld")),
            RespFrame::Null,
            RespFrame::NullArray,
            RespFrame::Array(vec![
                RespFrame::Integer(1),
                RespFrame::BulkString(Bytes::from_static(b"x")),
            ]),
        ];
        for value in values {
            let encoded = value.encode_to_vec();
            let (decoded, n) = try_parse(&encoded).unwrap().unwrap();
            assert_eq!(n, encoded.len());
            assert_eq!(decoded, value);
        }
    }
}
