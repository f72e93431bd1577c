// src/config.rs

//! Server configuration: parsed from command-line flags, not a config file.

use anyhow::{Result, anyhow};
use std::env;
use tracing::warn;

/// Where this instance's data comes from: a standalone leader, or a follower
/// replicating a `host:port` leader.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationConfig {
    Leader,
    Follower { host: String, port: u16 },
}

impl ReplicationConfig {
    pub fn is_follower(&self) -> bool {
        matches!(self, ReplicationConfig::Follower { .. })
    }
}

/// Fully resolved, immutable server configuration for one process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub dir: String,
    pub dbfilename: String,
    pub replication: ReplicationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 6379,
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
            replication: ReplicationConfig::Leader,
        }
    }
}

impl Config {
    /// Parses `--port`, `--replicaof <host> <port>`, `--dir`, `--dbfilename`
    /// from the process's own argv (skipping argv[0]).
    pub fn from_args() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    pub fn from_iter(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut config = Config::default();
        let mut iter = args.into_iter().peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    config.port = value
                        .parse()
                        .map_err(|_| anyhow!("invalid --port value '{value}'"))?;
                }
                "--dir" => {
                    config.dir = iter
                        .next()
                        .ok_or_else(|| anyhow!("--dir requires a value"))?;
                }
                "--dbfilename" => {
                    config.dbfilename = iter
                        .next()
                        .ok_or_else(|| anyhow!("--dbfilename requires a value"))?;
                }
                "--replicaof" => {
                    let first = iter
                        .next()
                        .ok_or_else(|| anyhow!("--replicaof requires '<host> <port>'"))?;
                    // Accept both `--replicaof host port` and the single
                    // quoted-string form `--replicaof "host port"`.
                    let (host, port_str) = match first.split_once(' ') {
                        Some((h, p)) => (h.to_string(), p.to_string()),
                        None => {
                            let port_str = iter
                                .next()
                                .ok_or_else(|| anyhow!("--replicaof requires '<host> <port>'"))?;
                            (first, port_str)
                        }
                    };
                    let port: u16 = port_str
                        .parse()
                        .map_err(|_| anyhow!("invalid --replicaof port '{port_str}'"))?;
                    config.replication = ReplicationConfig::Follower { host, port };
                }
                other => {
                    warn!("ignoring unrecognized argument '{other}'");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port must be nonzero"));
        }
        if let ReplicationConfig::Follower { host, .. } = &self.replication {
            if host.is_empty() {
                return Err(anyhow!("--replicaof host must not be empty"));
            }
        }
        Ok(())
    }

    /// `CONFIG GET` only ever recognises these two names.
    pub fn config_get(&self, name: &[u8]) -> Option<String> {
        match name {
            b"dir" => Some(self.dir.clone()),
            b"dbfilename" => Some(self.dbfilename.clone()),
            _ => None,
        }
    }

    pub fn rdb_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.dir).join(&self.dbfilename)
    }
}
