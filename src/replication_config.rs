use crate::protocol_constants::{ROLE_MASTER, ROLE_SLAVE};
use bytes::Bytes;
use log::{debug, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct ReplicationConfig {
    role: String,
    master_host: Option<String>,
    master_port: Option<u16>,
    master_replid: String,
    master_repl_offset: u64,
}

impl ReplicationConfig {
    pub fn new() -> Self {
        Self {
            role: ROLE_MASTER.to_string(),
            master_host: None,
            master_port: None,
            master_replid: Self::generate_replication_id(),
            master_repl_offset: 0,
        }
    }

    fn generate_replication_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(40)
            .map(char::from)
            .collect()
    }

    pub fn set_replica_of(&mut self, host: String, port: u16) {
        self.role = ROLE_SLAVE.to_string();
        self.master_host = Some(host);
        self.master_port = Some(port);
    }

    pub fn get_role(&self) -> &str {
        &self.role
    }

    pub fn get_master_replid(&self) -> &str {
        &self.master_replid
    }

    /// Body of `INFO replication`, newline-separated.
    pub fn get_replication_info(&self) -> String {
        let mut lines = vec!["# Replication".to_string(), format!("role:{}", self.role)];
        if self.role == ROLE_MASTER {
            lines.push(format!("master_replid:{}", self.master_replid));
            lines.push(format!("master_repl_offset:{}", self.master_repl_offset));
        }
        lines.join("\n")
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Followers that have completed `REPLCONF listening-port`, keyed by their
/// advertised `host:port`. Each entry is the outbound frame channel of the
/// follower's connection; the connection's writer task drains it, so frames
/// queued here interleave with replies in arrival order.
#[derive(Default)]
pub struct ReplicaRegistry {
    replicas: HashMap<String, mpsc::Sender<Bytes>>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self {
            replicas: HashMap::new(),
        }
    }

    /// Idempotent; a re-announcing follower overwrites its old channel.
    pub fn register(&mut self, addr: String, outbound: mpsc::Sender<Bytes>) {
        debug!("registered replica {}", addr);
        self.replicas.insert(addr, outbound);
    }

    /// Queues one frame per registered follower without blocking. A closed
    /// channel means the follower's writer died on a socket error, so the
    /// entry is dropped.
    pub fn propagate(&mut self, frame: &Bytes) {
        let mut dead = Vec::new();
        for (addr, outbound) in &self.replicas {
            match outbound.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("replica {} is lagging, dropping frame", addr);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("replica {} connection is gone, unregistering", addr);
                    dead.push(addr.clone());
                }
            }
        }
        for addr in dead {
            self.replicas.remove(&addr);
        }
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::OUTBOUND_QUEUE_DEPTH;

    #[test]
    fn replication_id_is_forty_alphanumeric_characters() {
        let config = ReplicationConfig::new();
        let replid = config.get_master_replid();
        assert_eq!(replid.len(), 40);
        assert!(replid.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn info_lines_for_master() {
        let config = ReplicationConfig::new();
        let info = config.get_replication_info();
        let lines: Vec<&str> = info.split('\n').collect();
        assert_eq!(lines[0], "# Replication");
        assert_eq!(lines[1], "role:master");
        assert!(lines[2].starts_with("master_replid:"));
        assert_eq!(lines[3], "master_repl_offset:0");
    }

    #[test]
    fn info_lines_for_slave() {
        let mut config = ReplicationConfig::new();
        config.set_replica_of("localhost".to_string(), 6379);
        let info = config.get_replication_info();
        assert_eq!(info, "# Replication\nrole:slave");
    }

    #[tokio::test]
    async fn propagate_reaches_every_replica_in_order() {
        let mut registry = ReplicaRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (tx_b, mut rx_b) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        registry.register("10.0.0.1:6380".to_string(), tx_a);
        registry.register("10.0.0.2:6380".to_string(), tx_b);

        registry.propagate(&Bytes::from_static(b"first"));
        registry.propagate(&Bytes::from_static(b"second"));

        assert_eq!(rx_a.recv().await.unwrap(), Bytes::from_static(b"first"));
        assert_eq!(rx_a.recv().await.unwrap(), Bytes::from_static(b"second"));
        assert_eq!(rx_b.recv().await.unwrap(), Bytes::from_static(b"first"));
        assert_eq!(rx_b.recv().await.unwrap(), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let mut registry = ReplicaRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.register("10.0.0.1:6380".to_string(), tx.clone());
        registry.register("10.0.0.1:6380".to_string(), tx);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn propagate_drops_closed_channels() {
        let mut registry = ReplicaRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        registry.register("10.0.0.1:6380".to_string(), tx);
        drop(rx);
        registry.propagate(&Bytes::from_static(b"frame"));
        assert!(registry.is_empty());
    }
}
