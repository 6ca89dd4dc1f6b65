use crate::keyspace::Keyspace;
use crate::replication_config::{ReplicaRegistry, ReplicationConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Config = Arc<RwLock<HashMap<String, String>>>;

/// Everything shared across connection tasks. Cheap to clone; each field is
/// its own lock so a propagation sweep never contends with a keyspace read.
#[derive(Clone)]
pub struct ServerState {
    pub keyspace: Arc<RwLock<Keyspace>>,
    pub config: Config,
    pub replication: Arc<RwLock<ReplicationConfig>>,
    pub replicas: Arc<RwLock<ReplicaRegistry>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            keyspace: Arc::new(RwLock::new(Keyspace::new())),
            config: Arc::new(RwLock::new(HashMap::new())),
            replication: Arc::new(RwLock::new(ReplicationConfig::new())),
            replicas: Arc::new(RwLock::new(ReplicaRegistry::new())),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}
