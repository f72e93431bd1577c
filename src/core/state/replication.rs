// src/core/state/replication.rs

//! Leader-side replication bookkeeping: a registry of connected replicas,
//! write-command propagation with byte-offset accounting, and the `WAIT`
//! synchronous-acknowledgement condition.

use crate::core::protocol::RespFrame;
use bytes::Bytes;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// A registered replica connection: a channel feeding raw bytes to the task
/// that owns the actual socket, plus the last acknowledged offset.
struct ReplicaHandle {
    id: u64,
    sender: mpsc::UnboundedSender<Bytes>,
    ack_offset: u64,
}

/// Leader-side replication bookkeeping.
pub struct ReplicationState {
    pub replication_id: String,
    master_offset: AtomicU64,
    next_replica_id: AtomicU64,
    replicas: Mutex<Vec<ReplicaHandle>>,
    // Bumped on every `process_ack`; `wait` subscribes to this to be notified
    // without risking the missed-wakeup race a bare `Notify` has.
    ack_version: watch::Sender<u64>,
}

impl Default for ReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationState {
    pub fn new() -> Self {
        Self {
            replication_id: generate_replid(),
            master_offset: AtomicU64::new(0),
            next_replica_id: AtomicU64::new(1),
            replicas: Mutex::new(Vec::new()),
            ack_version: watch::channel(0).0,
        }
    }

    pub fn master_offset(&self) -> u64 {
        self.master_offset.load(Ordering::SeqCst)
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    /// Registers a newly-promoted replica connection and returns an id used
    /// to address it later (`process_ack`, `remove_replica`).
    pub fn register_replica(&self, sender: mpsc::UnboundedSender<Bytes>) -> u64 {
        let id = self.next_replica_id.fetch_add(1, Ordering::SeqCst);
        self.replicas.lock().unwrap().push(ReplicaHandle {
            id,
            sender,
            ack_offset: 0,
        });
        id
    }

    pub fn remove_replica(&self, id: u64) {
        self.replicas.lock().unwrap().retain(|r| r.id != id);
    }

    /// Encodes `frame`, fans it out to every replica, and advances
    /// `master_offset` by the encoded length — all under one lock, so
    /// concurrent callers observe a single total propagation order.
    pub fn propagate(&self, frame: &RespFrame) -> u64 {
        let encoded = frame.encode_to_vec();
        let len = encoded.len() as u64;
        let payload = Bytes::from(encoded);

        let mut guard = self.replicas.lock().unwrap();
        guard.retain(|r| r.sender.send(payload.clone()).is_ok());
        drop(guard);

        self.master_offset.fetch_add(len, Ordering::SeqCst) + len
    }

    /// Sends a frame to every replica without touching `master_offset` — used
    /// for the single `GETACK` broadcast per `wait` call.
    fn broadcast_raw(&self, frame: &RespFrame) {
        let encoded = Bytes::from(frame.encode_to_vec());
        let mut guard = self.replicas.lock().unwrap();
        guard.retain(|r| r.sender.send(encoded.clone()).is_ok());
    }

    pub fn process_ack(&self, replica_id: u64, offset: u64) {
        let mut guard = self.replicas.lock().unwrap();
        if let Some(r) = guard.iter_mut().find(|r| r.id == replica_id) {
            if offset > r.ack_offset {
                r.ack_offset = offset;
            }
        }
        drop(guard);
        self.ack_version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn count_acked(&self, target: u64) -> u64 {
        self.replicas
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.ack_offset >= target)
            .count() as u64
    }

    /// Implements `WAIT numreplicas timeout_ms`. Fixes the target offset at
    /// call entry, broadcasts exactly one `GETACK`, and waits for enough
    /// replicas to acknowledge at least that offset or for the deadline.
    pub async fn wait(&self, num_replicas: i64, timeout_ms: i64) -> u64 {
        let target = self.master_offset();
        if target == 0 || num_replicas <= 0 {
            return self.replica_count() as u64;
        }

        self.broadcast_raw(&RespFrame::command(&[b"REPLCONF", b"GETACK", b"*"]));

        let deadline = Instant::now() + Duration::from_millis(timeout_ms.max(0) as u64);
        let mut rx = self.ack_version.subscribe();
        loop {
            let acked = self.count_acked(target);
            if acked >= num_replicas as u64 {
                return acked;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return acked;
            }
            // Either outcome just means "recheck": a change notification means
            // new data, a timeout falls through to the deadline check above.
            let _ = timeout(remaining, rx.changed()).await;
        }
    }
}

fn generate_replid() -> String {
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| {
            let n: u8 = rng.gen_range(0..16);
            std::char::from_digit(n as u32, 16).unwrap()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_target_is_zero() {
        let repl = ReplicationState::new();
        let acked = repl.wait(1, 1000).await;
        assert_eq!(acked, 0);
    }

    #[tokio::test]
    async fn wait_times_out_with_no_acking_replicas() {
        let repl = ReplicationState::new();
        repl.master_offset.store(10, Ordering::SeqCst);
        let start = Instant::now();
        let acked = repl.wait(1, 50).await;
        assert_eq!(acked, 0);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn wait_returns_as_soon_as_enough_replicas_ack() {
        let repl = std::sync::Arc::new(ReplicationState::new());
        repl.master_offset.store(10, Ordering::SeqCst);
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = repl.register_replica(tx);

        let waiter_repl = repl.clone();
        let waiter = tokio::spawn(async move { waiter_repl.wait(1, 5000).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        repl.process_ack(id, 10);

        let acked = waiter.await.unwrap();
        assert_eq!(acked, 1);
    }
}
