// src/core/persistence/mod.rs

//! On-disk RDB loading (startup only) and the fixed empty-RDB payload sent
//! to a newly-promoted replica after `FULLRESYNC`.

pub mod rdb;

pub use rdb::{EMPTY_RDB_PAYLOAD, RdbLoader};
