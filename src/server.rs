use crate::command::{Command, CommandResponse, HandlerContext};
use crate::protocol_constants::OUTBOUND_QUEUE_DEPTH;
use crate::resp::{self, RespParser};
use crate::state_manager::ServerState;
use bytes::Bytes;
use log::{debug, error};
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Accepts connections forever, one task per client.
pub async fn run(listener: TcpListener, state: ServerState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, addr, state).await;
                });
            }
            Err(e) => error!("failed to accept connection: {}", e),
        }
    }
}

/// Reads framed commands until the peer closes or sends something
/// unparseable. All writes go through the outbound channel so replies and
/// propagated frames share one writer and keep their order.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: ServerState) {
    debug!("client connected from {}", addr);
    let peer_host = addr.ip().to_string();
    let (read_half, write_half) = stream.into_split();

    let (outbound, frames) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_DEPTH);
    tokio::spawn(write_frames(write_half, frames, addr));

    let mut parser = RespParser::new(BufReader::new(read_half));
    while let Some(value) = parser.parse().await {
        let Some(args) = value.into_args() else {
            debug!("non-command frame from {}, closing", addr);
            break;
        };
        let ctx = HandlerContext {
            args,
            peer_host: peer_host.clone(),
            outbound: outbound.clone(),
        };

        let reply_frames = match Command::parse(&ctx.args) {
            Ok(command) => match command.execute(&ctx, &state).await {
                Ok(responses) => responses.iter().map(CommandResponse::encode).collect(),
                Err(e) => vec![resp::encode_error(&e.to_string())],
            },
            Err(e) => vec![resp::encode_error(&e.to_string())],
        };
        for frame in reply_frames {
            if outbound.send(frame).await.is_err() {
                debug!("writer for {} is gone", addr);
                return;
            }
        }
    }
    debug!("client {} disconnected", addr);
}

async fn write_frames(
    mut write_half: OwnedWriteHalf,
    mut frames: mpsc::Receiver<Bytes>,
    addr: SocketAddr,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            error!("write to {} failed: {}", addr, e);
            break;
        }
    }
}
