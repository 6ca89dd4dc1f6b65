use crate::errors::CommandError;
use crate::protocol_constants::*;
use crate::resp::{self, RespValue};
use crate::state_manager::ServerState;
use crate::value_entry::ValueEntry;
use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::mpsc;

/// Per-invocation context built by the connection loop: the argument vector
/// exactly as supplied (verb first), the client host with the port stripped,
/// and the connection's outbound frame channel.
pub struct HandlerContext {
    pub args: Vec<String>,
    pub peer_host: String,
    pub outbound: mpsc::Sender<Bytes>,
}

pub enum CommandResponse {
    Value(RespValue),
    /// Raw snapshot transfer; framed without a trailing CRLF.
    Rdb(Vec<u8>),
}

impl CommandResponse {
    pub fn encode(&self) -> Bytes {
        match self {
            CommandResponse::Value(value) => value.encode(),
            CommandResponse::Rdb(payload) => resp::encode_rdb(payload),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetCondition {
    /// NX: only set when the key is absent.
    IfAbsent,
    /// XX: only set when the key is present.
    IfPresent,
}

#[derive(Debug)]
pub enum Command {
    Ping,
    Echo(String),
    Get(String),
    Set {
        key: String,
        value: String,
        condition: Option<SetCondition>,
        ttl_ms: Option<u64>,
    },
    Keys(String),
    ConfigGet(Vec<String>),
    Info(Vec<String>),
    Replconf(Vec<String>),
    Psync(Vec<String>),
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Command, CommandError> {
        let verb = args
            .first()
            .ok_or_else(|| CommandError::General("empty command".into()))?;
        match verb.to_uppercase().as_str() {
            // Real redis echoes a PING argument back; the argument is
            // deliberately ignored here.
            PING_COMMAND => Ok(Command::Ping),
            ECHO_COMMAND => {
                Self::check_args_len(args, 2)?;
                Ok(Command::Echo(args[1].clone()))
            }
            GET_COMMAND => {
                Self::check_args_len(args, 2)?;
                Ok(Command::Get(args[1].clone()))
            }
            SET_COMMAND => Self::parse_set(args),
            KEYS_COMMAND => {
                Self::check_args_len(args, 2)?;
                Ok(Command::Keys(args[1].clone()))
            }
            CONFIG_COMMAND => Self::parse_config(args),
            INFO_COMMAND => Ok(Command::Info(args[1..].to_vec())),
            REPLCONF_COMMAND => {
                if args.len() < 3 || (args.len() - 1) % 2 != 0 {
                    return Err(CommandError::WrongArgumentCount(
                        REPLCONF_COMMAND.to_lowercase(),
                    ));
                }
                Ok(Command::Replconf(args[1..].to_vec()))
            }
            PSYNC_COMMAND => {
                Self::check_args_len(args, 3)?;
                Ok(Command::Psync(args[1..].to_vec()))
            }
            _ => Err(CommandError::UnknownCommand(verb.clone())),
        }
    }

    fn check_args_len(args: &[String], expected_len: usize) -> Result<(), CommandError> {
        if args.len() != expected_len {
            return Err(CommandError::WrongArgumentCount(args[0].to_lowercase()));
        }
        Ok(())
    }

    fn parse_set(args: &[String]) -> Result<Command, CommandError> {
        if args.len() < 3 {
            return Err(CommandError::WrongArgumentCount(SET_COMMAND.to_lowercase()));
        }
        let key = args[1].clone();
        let value = args[2].clone();
        let mut condition = None;
        let mut ttl_ms = None;

        let mut index = 3;
        while index < args.len() {
            match args[index].to_uppercase().as_str() {
                NX_OPTION => {
                    if condition.is_some() {
                        return Err(CommandError::Syntax);
                    }
                    condition = Some(SetCondition::IfAbsent);
                    index += 1;
                }
                XX_OPTION => {
                    if condition.is_some() {
                        return Err(CommandError::Syntax);
                    }
                    condition = Some(SetCondition::IfPresent);
                    index += 1;
                }
                EX_OPTION => {
                    if ttl_ms.is_some() {
                        return Err(CommandError::Syntax);
                    }
                    let seconds = Self::parse_option_value(args, index)?;
                    ttl_ms = Some(
                        seconds
                            .checked_mul(1000)
                            .ok_or(CommandError::InvalidInteger)?,
                    );
                    index += 2;
                }
                PX_OPTION => {
                    if ttl_ms.is_some() {
                        return Err(CommandError::Syntax);
                    }
                    ttl_ms = Some(Self::parse_option_value(args, index)?);
                    index += 2;
                }
                other => {
                    warn!("ignoring unknown SET option '{}'", other);
                    index += 1;
                }
            }
        }

        Ok(Command::Set {
            key,
            value,
            condition,
            ttl_ms,
        })
    }

    fn parse_option_value(args: &[String], index: usize) -> Result<u64, CommandError> {
        let raw = args.get(index + 1).ok_or(CommandError::Syntax)?;
        raw.parse::<u64>().map_err(|_| CommandError::InvalidInteger)
    }

    fn parse_config(args: &[String]) -> Result<Command, CommandError> {
        if args.len() < 3 {
            return Err(CommandError::WrongArgumentCount(
                CONFIG_COMMAND.to_lowercase(),
            ));
        }
        if !args[1].eq_ignore_ascii_case(CONFIG_GET_OPTION) {
            return Err(CommandError::General(format!(
                "unsupported CONFIG subcommand '{}'",
                args[1]
            )));
        }
        Ok(Command::ConfigGet(args[2..].to_vec()))
    }

    pub async fn execute(
        &self,
        ctx: &HandlerContext,
        state: &ServerState,
    ) -> Result<Vec<CommandResponse>, CommandError> {
        match self {
            Command::Ping => Ok(vec![CommandResponse::Value(RespValue::SimpleString(
                PONG_RESPONSE.to_string(),
            ))]),
            Command::Echo(message) => Ok(vec![CommandResponse::Value(
                RespValue::SimpleString(message.clone()),
            )]),
            Command::Get(key) => {
                let mut keyspace = state.keyspace.write().await;
                Ok(vec![CommandResponse::Value(RespValue::BulkString(
                    keyspace.get(key),
                ))])
            }
            Command::Set {
                key,
                value,
                condition,
                ttl_ms,
            } => Self::execute_set(key, value, *condition, *ttl_ms, ctx, state).await,
            Command::Keys(pattern) => {
                let keyspace = state.keyspace.read().await;
                let items = keyspace
                    .get_keys(pattern)
                    .into_iter()
                    .map(|key| RespValue::BulkString(Some(key)))
                    .collect();
                Ok(vec![CommandResponse::Value(RespValue::Array(Some(items)))])
            }
            Command::ConfigGet(params) => {
                let config = state.config.read().await;
                let mut items = Vec::with_capacity(params.len() * 2);
                for param in params {
                    items.push(RespValue::BulkString(Some(param.clone())));
                    items.push(RespValue::BulkString(config.get(param).cloned()));
                }
                Ok(vec![CommandResponse::Value(RespValue::Array(Some(items)))])
            }
            Command::Info(sections) => {
                let wants_replication = sections.is_empty()
                    || sections
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(REPLICATION_SECTION));
                let body = if wants_replication {
                    state.replication.read().await.get_replication_info()
                } else {
                    String::new()
                };
                Ok(vec![CommandResponse::Value(RespValue::BulkString(Some(
                    body,
                )))])
            }
            Command::Replconf(args) => Self::execute_replconf(args, ctx, state).await,
            Command::Psync(args) => Self::execute_psync(args, state).await,
        }
    }

    async fn execute_set(
        key: &str,
        value: &str,
        condition: Option<SetCondition>,
        ttl_ms: Option<u64>,
        ctx: &HandlerContext,
        state: &ServerState,
    ) -> Result<Vec<CommandResponse>, CommandError> {
        {
            // One write guard across the condition check and the insert so
            // concurrent SET NX calls cannot both succeed.
            let mut keyspace = state.keyspace.write().await;
            let exists = keyspace.key_exists(key);
            match condition {
                Some(SetCondition::IfAbsent) if exists => {
                    return Ok(vec![CommandResponse::Value(RespValue::BulkString(None))]);
                }
                Some(SetCondition::IfPresent) if !exists => {
                    return Ok(vec![CommandResponse::Value(RespValue::BulkString(None))]);
                }
                _ => {}
            }
            keyspace.set(
                key.to_string(),
                ValueEntry::new_relative(value.to_string(), ttl_ms),
            );
        }

        if state.replication.read().await.get_role() == ROLE_MASTER {
            let arg_refs: Vec<&str> = ctx.args.iter().map(String::as_str).collect();
            let frame = resp::encode_command(&arg_refs);
            state.replicas.write().await.propagate(&frame);
        }

        Ok(vec![CommandResponse::Value(RespValue::SimpleString(
            OK_RESPONSE.to_string(),
        ))])
    }

    async fn execute_replconf(
        args: &[String],
        ctx: &HandlerContext,
        state: &ServerState,
    ) -> Result<Vec<CommandResponse>, CommandError> {
        for pair in args.chunks(2) {
            let (key, value) = (&pair[0], &pair[1]);
            if key.eq_ignore_ascii_case(LISTENING_PORT_OPTION) {
                let addr = format!("{}:{}", ctx.peer_host, value);
                state
                    .replicas
                    .write()
                    .await
                    .register(addr, ctx.outbound.clone());
            } else if key.eq_ignore_ascii_case(CAPA_OPTION) {
                debug!("replica capability {}", value);
            } else {
                debug!("ignoring REPLCONF {} {}", key, value);
            }
        }
        Ok(vec![CommandResponse::Value(RespValue::SimpleString(
            OK_RESPONSE.to_string(),
        ))])
    }

    async fn execute_psync(
        args: &[String],
        state: &ServerState,
    ) -> Result<Vec<CommandResponse>, CommandError> {
        debug!("PSYNC {} {}", args[0], args[1]);
        let replid = state
            .replication
            .read()
            .await
            .get_master_replid()
            .to_string();
        let header = format!("{} {} 0", FULLRESYNC_RESPONSE, replid);
        let payload = Self::load_snapshot_bytes(state).await;
        Ok(vec![
            CommandResponse::Value(RespValue::SimpleString(header)),
            CommandResponse::Rdb(payload),
        ])
    }

    async fn load_snapshot_bytes(state: &ServerState) -> Vec<u8> {
        let (dir, dbfilename) = {
            let config = state.config.read().await;
            (
                config.get("dir").cloned().unwrap_or_default(),
                config.get("dbfilename").cloned().unwrap_or_default(),
            )
        };
        if !dir.is_empty() && !dbfilename.is_empty() {
            let path = format!("{}/{}", dir, dbfilename);
            match tokio::fs::read(&path).await {
                Ok(bytes) => return bytes,
                Err(e) => debug!("no snapshot at {} ({}), serving empty RDB", path, e),
            }
        }
        EMPTY_RDB.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // The receiver side is dropped; tests that need the outbound frames
    // register their own channel in the replica registry instead.
    fn ctx(args: &[&str]) -> HandlerContext {
        let (outbound, _) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        HandlerContext {
            args: args.iter().map(|s| s.to_string()).collect(),
            peer_host: "127.0.0.1".to_string(),
            outbound,
        }
    }

    async fn run(state: &ServerState, args: &[&str]) -> Vec<Bytes> {
        let ctx = ctx(args);
        let command = Command::parse(&ctx.args).unwrap();
        command
            .execute(&ctx, state)
            .await
            .unwrap()
            .iter()
            .map(CommandResponse::encode)
            .collect()
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let state = ServerState::new();
        let frames = run(&state, &["PING"]).await;
        assert_eq!(&frames[0][..], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn echo_replies_message() {
        let state = ServerState::new();
        let frames = run(&state, &["ECHO", "hey"]).await;
        assert_eq!(&frames[0][..], b"+hey\r\n");
    }

    #[tokio::test]
    async fn verbs_are_case_insensitive() {
        let state = ServerState::new();
        let frames = run(&state, &["ping"]).await;
        assert_eq!(&frames[0][..], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let state = ServerState::new();
        assert_eq!(&run(&state, &["SET", "foo", "bar"]).await[0][..], b"+OK\r\n");
        assert_eq!(
            &run(&state, &["GET", "foo"]).await[0][..],
            b"$3\r\nbar\r\n"
        );
        assert_eq!(&run(&state, &["GET", "nope"]).await[0][..], b"$-1\r\n");
    }

    #[tokio::test]
    async fn set_with_px_expires() {
        let state = ServerState::new();
        run(&state, &["SET", "foo", "bar", "PX", "30"]).await;
        assert_eq!(
            &run(&state, &["GET", "foo"]).await[0][..],
            b"$3\r\nbar\r\n"
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(&run(&state, &["GET", "foo"]).await[0][..], b"$-1\r\n");
    }

    #[tokio::test]
    async fn set_nx_refuses_existing_key() {
        let state = ServerState::new();
        run(&state, &["SET", "foo", "bar"]).await;
        assert_eq!(
            &run(&state, &["SET", "foo", "other", "NX"]).await[0][..],
            b"$-1\r\n"
        );
        assert_eq!(
            &run(&state, &["GET", "foo"]).await[0][..],
            b"$3\r\nbar\r\n"
        );
    }

    #[tokio::test]
    async fn set_nx_sets_missing_key() {
        let state = ServerState::new();
        assert_eq!(
            &run(&state, &["SET", "foo", "bar", "NX"]).await[0][..],
            b"+OK\r\n"
        );
    }

    #[tokio::test]
    async fn set_xx_refuses_missing_key() {
        let state = ServerState::new();
        assert_eq!(
            &run(&state, &["SET", "foo", "bar", "XX"]).await[0][..],
            b"$-1\r\n"
        );
        assert_eq!(&run(&state, &["GET", "foo"]).await[0][..], b"$-1\r\n");
    }

    #[tokio::test]
    async fn set_xx_updates_existing_key() {
        let state = ServerState::new();
        run(&state, &["SET", "foo", "bar"]).await;
        assert_eq!(
            &run(&state, &["SET", "foo", "baz", "XX"]).await[0][..],
            b"+OK\r\n"
        );
        assert_eq!(
            &run(&state, &["GET", "foo"]).await[0][..],
            b"$3\r\nbaz\r\n"
        );
    }

    #[test]
    fn set_rejects_both_ex_and_px() {
        let args: Vec<String> = ["SET", "k", "v", "EX", "10", "PX", "100"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(matches!(Command::parse(&args), Err(CommandError::Syntax)));
    }

    #[test]
    fn set_rejects_negative_ttl() {
        let args: Vec<String> = ["SET", "k", "v", "PX", "-5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(matches!(
            Command::parse(&args),
            Err(CommandError::InvalidInteger)
        ));
    }

    #[tokio::test]
    async fn set_skips_unknown_options() {
        let state = ServerState::new();
        assert_eq!(
            &run(&state, &["SET", "k", "v", "KEEPTTL"]).await[0][..],
            b"+OK\r\n"
        );
    }

    #[tokio::test]
    async fn keys_matches_glob() {
        let state = ServerState::new();
        run(&state, &["SET", "foo", "1"]).await;
        run(&state, &["SET", "food", "2"]).await;
        run(&state, &["SET", "bar", "3"]).await;
        let frames = run(&state, &["KEYS", "fo*"]).await;
        let reply = String::from_utf8(frames[0].to_vec()).unwrap();
        assert!(reply.starts_with("*2\r\n"));
        assert!(reply.contains("$3\r\nfoo\r\n"));
        assert!(reply.contains("$4\r\nfood\r\n"));
    }

    #[tokio::test]
    async fn config_get_returns_pairs_and_null_for_missing() {
        let state = ServerState::new();
        state
            .config
            .write()
            .await
            .insert("dir".to_string(), "/data".to_string());
        let frames = run(&state, &["CONFIG", "GET", "dir", "nothere"]).await;
        assert_eq!(
            &frames[0][..],
            b"*4\r\n$3\r\ndir\r\n$5\r\n/data\r\n$7\r\nnothere\r\n$-1\r\n"
        );
    }

    #[tokio::test]
    async fn info_replication_reports_master_role() {
        let state = ServerState::new();
        let frames = run(&state, &["INFO", "replication"]).await;
        let reply = String::from_utf8(frames[0].to_vec()).unwrap();
        assert!(reply.contains("# Replication\nrole:master\nmaster_replid:"));
        assert!(reply.contains("master_repl_offset:0"));
    }

    #[tokio::test]
    async fn replconf_listening_port_registers_replica() {
        let state = ServerState::new();
        run(&state, &["REPLCONF", "listening-port", "6380"]).await;
        assert_eq!(state.replicas.read().await.len(), 1);
    }

    #[tokio::test]
    async fn set_propagates_to_registered_replica() {
        let state = ServerState::new();
        let (outbound, mut frames) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        state
            .replicas
            .write()
            .await
            .register("127.0.0.1:6380".to_string(), outbound);

        run(&state, &["SET", "foo", "bar", "PX", "500"]).await;
        let frame = frames.recv().await.unwrap();
        assert_eq!(
            &frame[..],
            b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\nPX\r\n$3\r\n500\r\n"
        );
    }

    #[tokio::test]
    async fn slave_does_not_propagate() {
        let state = ServerState::new();
        state
            .replication
            .write()
            .await
            .set_replica_of("localhost".to_string(), 6379);
        let (outbound, mut frames) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        state
            .replicas
            .write()
            .await
            .register("127.0.0.1:6380".to_string(), outbound);

        run(&state, &["SET", "foo", "bar"]).await;
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn psync_replies_fullresync_then_raw_rdb() {
        let state = ServerState::new();
        let ctx = ctx(&["PSYNC", "?", "-1"]);
        let command = Command::parse(&ctx.args).unwrap();
        let responses = command.execute(&ctx, &state).await.unwrap();
        assert_eq!(responses.len(), 2);

        let header = String::from_utf8(responses[0].encode().to_vec()).unwrap();
        assert!(header.starts_with("+FULLRESYNC "));
        assert!(header.ends_with(" 0\r\n"));

        let rdb = responses[1].encode();
        let expected_prefix = format!("${}\r\n", EMPTY_RDB.len());
        assert!(rdb.starts_with(expected_prefix.as_bytes()));
        assert!(rdb.ends_with(&EMPTY_RDB[EMPTY_RDB.len() - 8..]));
        assert_eq!(rdb.len(), expected_prefix.len() + EMPTY_RDB.len());
    }

    #[test]
    fn unknown_command_is_rejected() {
        let args = vec!["FLUSHALL".to_string()];
        let err = Command::parse(&args).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized command 'FLUSHALL'");
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let args = vec!["GET".to_string()];
        let err = Command::parse(&args).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wrong number of arguments for 'get' command"
        );
    }
}
