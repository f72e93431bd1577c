// src/core/storage/string_store.rs

use crate::core::errors::SpinelDBError;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

struct StringEntry {
    value: Bytes,
    expires_at: Option<SystemTime>,
}

impl StringEntry {
    fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }
}

/// Key -> (value, optional expiry deadline). Lazily expires entries on read.
#[derive(Default)]
pub struct StringStore {
    entries: RwLock<HashMap<Bytes, StringEntry>>,
}

impl StringStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: Bytes, value: Bytes) {
        let mut guard = self.entries.write().unwrap();
        guard.insert(
            key,
            StringEntry {
                value,
                expires_at: None,
            },
        );
    }

    pub fn set_px(&self, key: Bytes, value: Bytes, deadline: SystemTime) {
        let mut guard = self.entries.write().unwrap();
        guard.insert(
            key,
            StringEntry {
                value,
                expires_at: Some(deadline),
            },
        );
    }

    /// Loads an entry from the RDB snapshot at startup. Bypasses TTL clamping
    /// semantics since the deadline is whatever was persisted.
    pub fn load(&self, key: Bytes, value: Bytes, expires_at: Option<SystemTime>) {
        let mut guard = self.entries.write().unwrap();
        guard.insert(key, StringEntry { value, expires_at });
    }

    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = SystemTime::now();
        {
            let guard = self.entries.read().unwrap();
            match guard.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: remove and report absence.
        let mut guard = self.entries.write().unwrap();
        guard.remove(key);
        None
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Increments the integer value stored at `key`, creating it at 1 if absent.
    pub fn incr(&self, key: &[u8]) -> Result<i64, SpinelDBError> {
        let now = SystemTime::now();
        let mut guard = self.entries.write().unwrap();

        let expired = matches!(guard.get(key), Some(e) if e.is_expired(now));
        if expired {
            guard.remove(key);
        }

        match guard.get_mut(key) {
            Some(entry) => {
                let current: i64 = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(SpinelDBError::NotAnInteger)?;
                let next = current
                    .checked_add(1)
                    .ok_or(SpinelDBError::Overflow)?;
                entry.value = Bytes::from(next.to_string());
                Ok(next)
            }
            None => {
                guard.insert(
                    Bytes::copy_from_slice(key),
                    StringEntry {
                        value: Bytes::from_static(b"1"),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    /// Sweeps expired entries, then returns every live key. Order is unspecified.
    pub fn keys(&self) -> Vec<Bytes> {
        let now = SystemTime::now();
        let mut guard = self.entries.write().unwrap();
        guard.retain(|_, entry| !entry.is_expired(now));
        guard.keys().cloned().collect()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.exists(key)
    }
}

/// A duration far enough out that any `SystemTime` still adds it without
/// overflow on every supported platform, used as the saturating fallback
/// below instead of panicking on an absurdly large `PX`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `SystemTime::now() + Duration::from_millis(ms)` panics on overflow, and
/// `PX` accepts any `u64` millisecond count (e.g. `u64::MAX`), so a naive
/// add can kill the connection task on otherwise-valid input. `checked_add`
/// plus a saturating far-future fallback keeps this panic-free.
pub fn deadline_from_millis(ms: u64) -> SystemTime {
    SystemTime::now()
        .checked_add(Duration::from_millis(ms))
        .unwrap_or_else(|| SystemTime::now() + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn get_after_expiry_returns_none() {
        let store = StringStore::new();
        store.set_px(
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v"),
            SystemTime::now() + Duration::from_millis(20),
        );
        assert_eq!(store.get(b"k"), Some(Bytes::from_static(b"v")));
        sleep(Duration::from_millis(40));
        assert_eq!(store.get(b"k"), None);
    }

    #[test]
    fn incr_creates_and_increments() {
        let store = StringStore::new();
        assert_eq!(store.incr(b"counter").unwrap(), 1);
        assert_eq!(store.incr(b"counter").unwrap(), 2);
    }

    #[test]
    fn incr_on_non_numeric_value_errors() {
        let store = StringStore::new();
        store.set(Bytes::from_static(b"k"), Bytes::from_static(b"abc"));
        assert_eq!(store.incr(b"k").unwrap_err(), SpinelDBError::NotAnInteger);
    }

    #[test]
    fn deadline_from_millis_does_not_panic_on_u64_max() {
        let deadline = deadline_from_millis(u64::MAX);
        assert!(deadline > SystemTime::now());
    }

    #[test]
    fn set_clears_previous_expiry() {
        let store = StringStore::new();
        store.set_px(
            Bytes::from_static(b"k"),
            Bytes::from_static(b"v1"),
            SystemTime::now() + Duration::from_millis(10),
        );
        store.set(Bytes::from_static(b"k"), Bytes::from_static(b"v2"));
        sleep(Duration::from_millis(30));
        assert_eq!(store.get(b"k"), Some(Bytes::from_static(b"v2")));
    }
}
