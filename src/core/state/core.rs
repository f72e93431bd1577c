// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server state.

use super::replication::ReplicationState;
use crate::config::Config;
use crate::core::storage::{StreamStore, StringStore};
use std::time::Instant;

/// All state shared across connection handlers: the two data stores, leader
/// replication bookkeeping, and the resolved configuration.
pub struct ServerState {
    pub config: Config,
    pub string_store: StringStore,
    pub stream_store: StreamStore,
    pub replication: ReplicationState,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            string_store: StringStore::new(),
            stream_store: StreamStore::new(),
            replication: ReplicationState::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_with_zero_offset() {
        let state = ServerState::new(Config::default());
        assert_eq!(state.replication.master_offset(), 0);
    }
}
