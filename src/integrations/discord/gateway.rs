//! Discord gateway connection
//!
//! A background task owns the websocket. It keeps the connection alive with
//! heartbeats, applies queued presence updates and forwards slash-command
//! interactions. Dropped connections are re-established with a capped
//! exponential backoff; the last status is re-sent in the new Identify.

use super::protocol::{self, opcode, GatewayFrame, Hello, Interaction, Ready};
use crate::util::try_send_or_log;
use anyhow::{Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Time allowed for the server's Hello after connecting
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered interactions awaiting a reply
const INTERACTION_BUFFER: usize = 32;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = SplitSink<Socket, Message>;
type Stream = SplitStream<Socket>;

/// Requests for the gateway task
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    SetStatus(String),
    Shutdown,
}

/// Why a connection ended
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Reconnect(String),
    Fatal(String),
}

/// Handle to the running gateway task
pub struct GatewayHandle {
    commands: mpsc::UnboundedSender<GatewayCommand>,
    task: JoinHandle<()>,
}

impl GatewayHandle {
    /// Sender for queueing commands to the gateway task
    pub fn sender(&self) -> mpsc::UnboundedSender<GatewayCommand> {
        self.commands.clone()
    }

    /// Close the connection and wait briefly for the task to end
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(GatewayCommand::Shutdown);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Gateway task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!("Gateway task did not stop in time, aborting");
                self.task.abort();
            }
        }
    }
}

/// Spawn the gateway task.
///
/// Returns the handle and the stream of slash-command interactions.
pub fn spawn(url: String, token: String) -> (GatewayHandle, mpsc::Receiver<Interaction>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (interactions_tx, interactions_rx) = mpsc::channel(INTERACTION_BUFFER);

    let task = tokio::spawn(run(url, token, commands_rx, interactions_tx));

    (
        GatewayHandle {
            commands: commands_tx,
            task,
        },
        interactions_rx,
    )
}

async fn run(
    url: String,
    token: String,
    mut commands: mpsc::UnboundedReceiver<GatewayCommand>,
    interactions: mpsc::Sender<Interaction>,
) {
    let mut status = String::new();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        tracing::info!("Discord gateway connecting...");
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                backoff = INITIAL_BACKOFF;
                match run_session(socket, &token, &mut status, &mut commands, &interactions).await
                {
                    SessionEnd::Shutdown => {
                        tracing::info!("Discord gateway closed");
                        return;
                    }
                    SessionEnd::Fatal(reason) => {
                        tracing::error!("Discord gateway stopped: {}", reason);
                        return;
                    }
                    SessionEnd::Reconnect(reason) => {
                        tracing::warn!("Discord gateway disconnected: {}", reason);
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to connect to Discord gateway: {}", e),
        }

        // Keep absorbing status updates while waiting to reconnect
        let sleep = tokio::time::sleep(backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(GatewayCommand::SetStatus(next)) => status = next,
                    Some(GatewayCommand::Shutdown) | None => return,
                },
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn run_session(
    socket: Socket,
    token: &str,
    status: &mut String,
    commands: &mut mpsc::UnboundedReceiver<GatewayCommand>,
    interactions: &mpsc::Sender<Interaction>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    let hello = match tokio::time::timeout(HELLO_TIMEOUT, wait_for_hello(&mut stream)).await {
        Ok(Ok(hello)) => hello,
        Ok(Err(e)) => return SessionEnd::Reconnect(format!("{:#}", e)),
        Err(_) => return SessionEnd::Reconnect("timed out waiting for Hello".to_string()),
    };

    if let Err(e) = send(&mut sink, protocol::identify(token, status)).await {
        return SessionEnd::Reconnect(format!("failed to identify: {:#}", e));
    }

    let period = Duration::from_millis(hello.heartbeat_interval.max(1));
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut sequence: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if let Err(e) = send(&mut sink, protocol::heartbeat(sequence)).await {
                    return SessionEnd::Reconnect(format!("failed to send heartbeat: {:#}", e));
                }
            }
            command = commands.recv() => match command {
                Some(GatewayCommand::SetStatus(next)) => {
                    *status = next;
                    if let Err(e) = send(&mut sink, protocol::presence_update(status)).await {
                        return SessionEnd::Reconnect(format!("failed to update presence: {:#}", e));
                    }
                }
                Some(GatewayCommand::Shutdown) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<GatewayFrame>(&text) {
                    Ok(frame) => {
                        if let Some(end) = handle_frame(frame, &mut sink, &mut sequence, interactions).await {
                            return end;
                        }
                    }
                    Err(e) => tracing::debug!("Ignoring malformed gateway frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    let reason = frame
                        .as_ref()
                        .map(|f| format!("closed with {} {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed".to_string());
                    if code.is_some_and(|c| protocol::FATAL_CLOSE_CODES.contains(&c)) {
                        return SessionEnd::Fatal(reason);
                    }
                    return SessionEnd::Reconnect(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Reconnect(e.to_string()),
                None => return SessionEnd::Reconnect("connection ended".to_string()),
            },
        }
    }
}

async fn handle_frame(
    frame: GatewayFrame,
    sink: &mut Sink,
    sequence: &mut Option<u64>,
    interactions: &mpsc::Sender<Interaction>,
) -> Option<SessionEnd> {
    if frame.s.is_some() {
        *sequence = frame.s;
    }

    match frame.op {
        opcode::DISPATCH => {
            handle_dispatch(frame.t.as_deref(), frame.d, interactions);
            None
        }
        opcode::HEARTBEAT => send(sink, protocol::heartbeat(*sequence))
            .await
            .err()
            .map(|e| SessionEnd::Reconnect(format!("failed to send heartbeat: {:#}", e))),
        opcode::RECONNECT => Some(SessionEnd::Reconnect("server requested reconnect".to_string())),
        opcode::INVALID_SESSION => Some(SessionEnd::Reconnect("invalid session".to_string())),
        opcode::HEARTBEAT_ACK => None,
        other => {
            tracing::trace!("Unhandled gateway opcode {}", other);
            None
        }
    }
}

async fn wait_for_hello(stream: &mut Stream) -> Result<Hello> {
    while let Some(message) = stream.next().await {
        match message.context("Gateway connection failed")? {
            Message::Text(text) => {
                let frame: GatewayFrame =
                    serde_json::from_str(&text).context("Malformed gateway frame")?;
                if frame.op == opcode::HELLO {
                    return serde_json::from_value(frame.d).context("Malformed Hello payload");
                }
            }
            Message::Close(frame) => {
                anyhow::bail!(
                    "Gateway closed before Hello ({})",
                    frame.map(|f| f.code).unwrap_or(CloseCode::Abnormal)
                );
            }
            _ => {}
        }
    }
    anyhow::bail!("Gateway connection ended before Hello")
}

/// Interactions are queued without waiting so a slow command runner never
/// holds up heartbeats.
fn handle_dispatch(event: Option<&str>, data: Value, interactions: &mpsc::Sender<Interaction>) {
    match event {
        Some("READY") => match serde_json::from_value::<Ready>(data) {
            Ok(ready) => tracing::info!("Discord connected as {}", ready.user.username),
            Err(_) => tracing::info!("Discord connected"),
        },
        Some("INTERACTION_CREATE") => match serde_json::from_value::<Interaction>(data) {
            Ok(interaction) if interaction.command_name().is_some() => {
                try_send_or_log(interactions, interaction, "interaction");
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Ignoring malformed interaction: {}", e),
        },
        _ => {}
    }
}

async fn send(sink: &mut Sink, payload: Value) -> Result<()> {
    sink.send(Message::Text(payload.to_string())).await?;
    Ok(())
}
