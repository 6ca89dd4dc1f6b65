use crate::command::{Command, HandlerContext};
use crate::protocol_constants::*;
use crate::rdb_parser::RdbParser;
use crate::resp::{self, RespParser, RespValue};
use crate::state_manager::ServerState;
use anyhow::{bail, Context};
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Runs the follower handshake against the master and, on success, leaves a
/// background task replaying the master's write stream into the keyspace.
/// Every handshake failure is terminal; the caller aborts startup.
pub async fn start(
    state: ServerState,
    master_host: String,
    master_port: u16,
    own_port: u16,
) -> anyhow::Result<()> {
    let master_addr = format!("{}:{}", master_host, master_port);
    let stream = TcpStream::connect(&master_addr)
        .await
        .with_context(|| format!("failed to connect to master {}", master_addr))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut parser = RespParser::new(BufReader::new(read_half));

    send_command(&mut write_half, &[PING_COMMAND]).await?;
    expect_simple(&mut parser, PONG_RESPONSE).await?;

    let own_port = own_port.to_string();
    send_command(
        &mut write_half,
        &[REPLCONF_COMMAND, LISTENING_PORT_OPTION, &own_port],
    )
    .await?;
    expect_simple(&mut parser, OK_RESPONSE).await?;

    send_command(&mut write_half, &[REPLCONF_COMMAND, CAPA_OPTION, "psync2"]).await?;
    expect_simple(&mut parser, OK_RESPONSE).await?;

    send_command(&mut write_half, &[PSYNC_COMMAND, "?", "-1"]).await?;
    match parser.parse().await {
        Some(RespValue::SimpleString(reply)) if reply.starts_with(FULLRESYNC_RESPONSE) => {
            info!("master offered full resync: {}", reply);
        }
        other => bail!("unexpected PSYNC reply from master: {:?}", other),
    }

    let rdb_bytes = parser
        .read_rdb_payload()
        .await
        .context("master closed the connection before sending the snapshot")?;
    info!("received {} byte snapshot from master", rdb_bytes.len());
    let records = RdbParser::new(&rdb_bytes[..])
        .parse()
        .context("master sent a malformed snapshot")?;
    state.keyspace.write().await.load_rdb(records);

    tokio::spawn(replay_loop(parser, state, master_host));
    Ok(())
}

/// Consumes propagated commands from the master on the handshake socket
/// until it closes. Replies are discarded.
async fn replay_loop(
    mut parser: RespParser<BufReader<OwnedReadHalf>>,
    state: ServerState,
    master_host: String,
) {
    let (outbound, mut discarded) = mpsc::channel::<Bytes>(1);
    tokio::spawn(async move { while discarded.recv().await.is_some() {} });

    while let Some(value) = parser.parse().await {
        let Some(args) = value.into_args() else {
            debug!("ignoring non-command frame from master");
            continue;
        };
        let ctx = HandlerContext {
            args,
            peer_host: master_host.clone(),
            outbound: outbound.clone(),
        };
        match Command::parse(&ctx.args) {
            Ok(command) => {
                if let Err(e) = command.execute(&ctx, &state).await {
                    warn!("failed to replay '{}' from master: {}", ctx.args[0], e);
                }
            }
            Err(e) => warn!("unparseable command from master: {}", e),
        }
    }
    info!("master connection closed, stopping replay");
}

async fn send_command(stream: &mut OwnedWriteHalf, args: &[&str]) -> anyhow::Result<()> {
    let frame = resp::encode_command(args);
    stream
        .write_all(&frame)
        .await
        .with_context(|| format!("failed to send {} to master", args[0]))
}

async fn expect_simple<R>(parser: &mut RespParser<R>, expected: &str) -> anyhow::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin + Send,
{
    match parser.parse().await {
        Some(RespValue::SimpleString(reply)) if reply == expected => Ok(()),
        other => bail!("expected +{} from master, got {:?}", expected, other),
    }
}
