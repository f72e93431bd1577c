// src/core/commands/command_trait.rs

//! Flags describing a command's effect on the dataset and replication stream.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CommandFlags: u32 {
        /// The command modifies the dataset and must be propagated to replicas.
        const WRITE    = 1 << 0;
        /// The command only reads data.
        const READONLY = 1 << 1;
        /// An administrative / connection-control command (PING, REPLCONF, ...).
        const ADMIN    = 1 << 2;
        /// Part of the MULTI/EXEC transaction machinery; never itself queued.
        const TRANSACTION = 1 << 3;
    }
}
