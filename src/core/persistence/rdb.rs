// src/core/persistence/rdb.rs

//! A read-only, best-effort parser for the subset of the RDB file format this
//! server understands: string values with optional expiry, skipping metadata
//! and hash-table-size hints. Used only to seed the string store at startup;
//! writing new snapshots is out of scope.

use bytes::Bytes;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

const OP_EXPIRETIME_MS: u8 = 0xFC;
const OP_EXPIRETIME_SEC: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_RESIZEDB: u8 = 0xFB;
const OP_AUX: u8 = 0xFA;
const OP_EOF: u8 = 0xFF;
const VALUE_TYPE_STRING: u8 = 0x00;

/// One key loaded from an RDB file, ready to seed the string store.
pub struct LoadedEntry {
    pub key: Bytes,
    pub value: Bytes,
    pub expires_at: Option<SystemTime>,
}

/// A minimal valid empty RDB payload: header, version, immediate EOF, and an
/// 8-byte checksum field (zeroed — checksum verification is not implemented,
/// matching real Redis's "disabled" sentinel).
pub const EMPTY_RDB_PAYLOAD: &[u8] = b"REDIS0011\xff\x00\x00\x00\x00\x00\x00\x00\x00";

pub struct RdbLoader;

impl RdbLoader {
    /// Loads `<dir>/<dbfilename>` if present. Any parse failure beyond the
    /// header aborts the load gracefully, keeping whatever was parsed so far;
    /// a missing file is not an error — the server simply starts empty.
    pub async fn load(path: &Path) -> Vec<LoadedEntry> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                info!("no RDB file loaded from {}: {e}", path.display());
                return Vec::new();
            }
        };
        match parse(&bytes) {
            Ok(entries) => {
                info!("loaded {} keys from {}", entries.len(), path.display());
                entries
            }
            Err(e) => {
                warn!("RDB load from {} stopped early: {e}", path.display());
                Vec::new()
            }
        }
    }

    /// Parses an already-received RDB payload, as delivered inline over the
    /// replication handshake rather than read from disk.
    pub fn load_from_bytes(bytes: &[u8]) -> Vec<LoadedEntry> {
        match parse(bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("RDB payload from leader rejected: {e}");
                Vec::new()
            }
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        if self.pos + n > self.buf.len() {
            return Err("unexpected end of file".to_string());
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn peek_byte(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Reads a Redis length-encoded integer. Returns `None` when the value
    /// was a special string encoding the caller should interpret separately
    /// (we don't re-read that byte; instead this returns the encoding type
    /// via `Err` for simplicity where callers only expect plain lengths).
    fn read_length(&mut self) -> Result<u64, String> {
        let first = self.byte()?;
        match first >> 6 {
            0b00 => Ok((first & 0x3f) as u64),
            0b01 => {
                let second = self.byte()?;
                Ok((((first & 0x3f) as u64) << 8) | second as u64)
            }
            0b10 => {
                let bytes = self.take(4)?;
                Ok(u32::from_be_bytes(bytes.try_into().unwrap()) as u64)
            }
            _ => Err("length-encoded string: special encoding used where a plain length was expected".to_string()),
        }
    }

    /// Reads a length-prefixed string, handling the `11` special encodings
    /// (8/16/32-bit little-endian integers stored as strings). Unknown
    /// special encodings are rejected — callers skip the whole load on error.
    fn read_string(&mut self) -> Result<Bytes, String> {
        let first = self.peek_byte().ok_or("unexpected end of file")?;
        if first >> 6 == 0b11 {
            self.pos += 1;
            let kind = first & 0x3f;
            let value = match kind {
                0 => {
                    let b = self.byte()? as i8;
                    b.to_string()
                }
                1 => {
                    let bytes = self.take(2)?;
                    i16::from_le_bytes(bytes.try_into().unwrap()).to_string()
                }
                2 => {
                    let bytes = self.take(4)?;
                    i32::from_le_bytes(bytes.try_into().unwrap()).to_string()
                }
                other => return Err(format!("unsupported special string encoding {other}")),
            };
            return Ok(Bytes::from(value));
        }
        let len = self.read_length()? as usize;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }
}

/// Parses the body of the file (past the header), stopping gracefully and
/// keeping whatever has already been decoded whenever it hits something it
/// doesn't understand: an unknown opcode, or a truncated record. Only a
/// malformed header is a hard failure — that leaves nothing trustworthy to
/// keep at all.
fn parse_body(cursor: &mut Cursor<'_>) -> Vec<LoadedEntry> {
    let mut entries = Vec::new();
    let mut pending_expiry: Option<SystemTime> = None;

    loop {
        let opcode = match cursor.byte() {
            Ok(b) => b,
            Err(_) => break, // Truncated file past the header: stop gracefully.
        };
        let result: Result<(), String> = match opcode {
            OP_EOF => break,
            OP_SELECTDB => cursor.read_length().map(|_| ()),
            OP_RESIZEDB => cursor
                .read_length()
                .and_then(|_| cursor.read_length())
                .map(|_| ()),
            OP_AUX => cursor
                .read_string()
                .and_then(|_| cursor.read_string())
                .map(|_| ()),
            OP_EXPIRETIME_MS => cursor.take(8).map(|bytes| {
                let ms = u64::from_le_bytes(bytes.try_into().unwrap());
                pending_expiry = Some(SystemTime::UNIX_EPOCH + Duration::from_millis(ms));
            }),
            OP_EXPIRETIME_SEC => cursor.take(4).map(|bytes| {
                let secs = u32::from_le_bytes(bytes.try_into().unwrap());
                pending_expiry =
                    Some(SystemTime::UNIX_EPOCH + Duration::from_millis(secs as u64 * 1000));
            }),
            VALUE_TYPE_STRING => {
                let outcome = cursor.read_string().and_then(|key| {
                    cursor.read_string().map(|value| {
                        entries.push(LoadedEntry {
                            key,
                            value,
                            expires_at: pending_expiry.take(),
                        });
                    })
                });
                outcome
            }
            unknown => Err(format!("unknown opcode 0x{unknown:02x}")),
        };
        if result.is_err() {
            break;
        }
    }
    entries
}

fn parse(bytes: &[u8]) -> Result<Vec<LoadedEntry>, String> {
    let mut cursor = Cursor::new(bytes);
    if cursor.take(5)? != b"REDIS" {
        return Err("missing REDIS magic".to_string());
    }
    cursor.take(4)?; // 4-byte version, unchecked.
    Ok(parse_body(&mut cursor))
}
