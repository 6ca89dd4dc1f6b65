use crate::rdb_parser::RdbParser;
use crate::replica_client;
use crate::state_manager::ServerState;
use anyhow::{bail, Context};
use log::info;
use std::env;

pub const DEFAULT_DIR: &str = "/tmp/redis-files";
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";
pub const DEFAULT_MASTER_PORT: u16 = 6379;
pub const DEFAULT_REPLICA_PORT: u16 = 6380;

/// Startup wiring: populates the config store from the command line, loads
/// the on-disk snapshot, and kicks off replication when configured as a
/// follower. Everything here runs before the first connection is accepted.
pub struct ConfigHandler {
    state: ServerState,
}

impl ConfigHandler {
    pub fn new(state: ServerState) -> Self {
        Self { state }
    }

    pub async fn load_config(&self) -> anyhow::Result<()> {
        let args: Vec<String> = env::args().collect();
        let parsed = Self::parse_args(&args)?;
        self.apply_config(parsed).await;
        Ok(())
    }

    pub async fn apply_config(&self, entries: Vec<(String, String)>) {
        let replid = self
            .state
            .replication
            .read()
            .await
            .get_master_replid()
            .to_string();

        let mut config = self.state.config.write().await;
        config.insert("dir".into(), DEFAULT_DIR.into());
        config.insert("dbfilename".into(), DEFAULT_DBFILENAME.into());
        config.insert("replicaof".into(), String::new());
        for (key, value) in entries {
            config.insert(key, value);
        }
        config.insert("master_replid".into(), replid);
        config.insert("master_repl_offset".into(), "0".into());
    }

    fn parse_args(args: &[String]) -> anyhow::Result<Vec<(String, String)>> {
        let mut result = Vec::new();
        let mut arg_index = 1;
        while arg_index < args.len() {
            let flag = args[arg_index].as_str();
            let key = match flag {
                "--dir" => "dir",
                "--dbfilename" => "dbfilename",
                "--port" => "port",
                "--replicaof" => "replicaof",
                other => bail!("'{}' is an unknown option", other),
            };
            let Some(value) = args.get(arg_index + 1) else {
                bail!("{} option requires an argument", flag);
            };
            result.push((key.into(), value.clone()));
            arg_index += 2;
        }
        Ok(result)
    }

    /// Masters default to 6379, followers to 6380, unless --port is given.
    pub async fn effective_port(&self) -> u16 {
        let config = self.state.config.read().await;
        if let Some(port) = config.get("port").and_then(|p| p.parse().ok()) {
            return port;
        }
        let is_replica = config
            .get("replicaof")
            .map(|r| !r.is_empty())
            .unwrap_or(false);
        if is_replica {
            DEFAULT_REPLICA_PORT
        } else {
            DEFAULT_MASTER_PORT
        }
    }

    /// Loads `dir/dbfilename` into the keyspace. A missing file starts the
    /// server empty; a malformed one aborts startup.
    pub async fn configure_db(&self) -> anyhow::Result<()> {
        let (dir, dbfilename) = {
            let config = self.state.config.read().await;
            (
                config.get("dir").cloned().unwrap_or_default(),
                config.get("dbfilename").cloned().unwrap_or_default(),
            )
        };
        if dir.is_empty() || dbfilename.is_empty() {
            return Ok(());
        }
        let path = format!("{}/{}", dir, dbfilename);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                info!("no snapshot at {} ({}), starting empty", path, e);
                return Ok(());
            }
        };
        let records = RdbParser::new(&bytes[..])
            .parse()
            .with_context(|| format!("malformed snapshot {}", path))?;
        info!("loaded {} keys from {}", records.len(), path);
        self.state.keyspace.write().await.load_rdb(records);
        Ok(())
    }

    /// When --replicaof is set, records the master address and runs the
    /// handshake. A failed handshake is a startup failure.
    pub async fn configure_replication(&self, own_port: u16) -> anyhow::Result<()> {
        let replicaof = self
            .state
            .config
            .read()
            .await
            .get("replicaof")
            .cloned()
            .unwrap_or_default();
        if replicaof.is_empty() {
            return Ok(());
        }

        let parts: Vec<&str> = replicaof.split_whitespace().collect();
        if parts.len() != 2 {
            bail!("--replicaof requires a host and port (e.g. 'localhost 6379')");
        }
        let host = parts[0].to_string();
        let port: u16 = parts[1]
            .parse()
            .context("--replicaof port must be a number")?;

        self.state
            .replication
            .write()
            .await
            .set_replica_of(host.clone(), port);
        replica_client::start(self.state.clone(), host, port, own_port).await
    }
}
