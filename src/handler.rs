//! Connection handler
//!
//! Drives one TCP connection through
//! `AwaitingCode → AwaitingUsername → Relaying → Closed`.
//! The read half is framed into lines and owned by the handler; the write
//! half belongs to a writer task fed through the connection's `ClientHandle`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::client::{Client, ClientHandle};
use crate::error::{AppError, InviteError};
use crate::invite::InviteGate;
use crate::message::ServerMessage;
use crate::registry::RegistryHandle;
use crate::types::ClientId;
use crate::username::validate_username;

/// Shared collaborators handed to every connection
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub registry: RegistryHandle,
    pub broadcaster: Broadcaster,
    pub gate: Arc<InviteGate>,
    pub settings: HandlerSettings,
}

/// Per-connection limits
#[derive(Debug, Clone, Copy)]
pub struct HandlerSettings {
    /// Longest accepted input line, in bytes
    pub max_line_length: usize,
    /// Outbound line queue capacity
    pub outbound_buffer: usize,
    /// Deadline for each socket write and each queued line
    pub write_timeout: Option<Duration>,
}

/// Connection lifecycle state
#[derive(Debug)]
enum State {
    AwaitingCode,
    AwaitingUsername,
    Relaying(Client),
    Closed,
}

/// Handle a new TCP connection
///
/// Runs the handshake and relay loop, then tears the connection down. The
/// teardown runs exactly once on every exit path; any error is returned
/// only after cleanup.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: HandlerContext,
) -> Result<(), AppError> {
    let client_id = ClientId::new();
    debug!("Client {} connected from {}", client_id, peer);

    let (read_half, write_half) = stream.into_split();
    let lines = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(ctx.settings.max_line_length),
    );

    // Channel for server -> client lines
    let (line_tx, line_rx) = mpsc::channel::<String>(ctx.settings.outbound_buffer);
    let closed = CancellationToken::new();
    let handle = ClientHandle::new(client_id, peer, line_tx, closed.clone());

    let writer = spawn_writer(write_half, line_rx, closed, ctx.settings.write_timeout);

    let mut connection = Connection {
        handle,
        lines,
        ctx,
        registered: None,
    };

    let result = connection.run().await;
    connection.teardown(writer).await;

    // Peer I/O failures end the connection but are not server faults
    match result {
        Ok(()) => {
            debug!("Client {} closed", client_id);
            Ok(())
        }
        Err(AppError::Io(e)) => {
            debug!("Client {} connection lost: {}", client_id, e);
            Ok(())
        }
        Err(AppError::Lines(e)) => {
            debug!("Client {} read failed: {}", client_id, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// State owned by one connection's handler task
struct Connection {
    handle: ClientHandle,
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    ctx: HandlerContext,
    /// Set while the client is in the registry
    registered: Option<Client>,
}

impl Connection {
    /// Step the state machine until it reaches `Closed`
    async fn run(&mut self) -> Result<(), AppError> {
        let mut state = State::AwaitingCode;
        loop {
            state = match state {
                State::AwaitingCode => self.await_code().await?,
                State::AwaitingUsername => self.await_username().await?,
                State::Relaying(client) => self.relay(client).await?,
                State::Closed => return Ok(()),
            };
        }
    }

    async fn await_code(&mut self) -> Result<State, AppError> {
        self.reply(ServerMessage::InvitePrompt).await?;
        let Some(token) = self.read_line().await? else {
            return Ok(State::Closed);
        };

        match self.ctx.gate.validate(&token) {
            Ok(code) => {
                debug!("Client {} presented invite code {}", self.handle.id(), code);
                Ok(State::AwaitingUsername)
            }
            Err(e) => {
                match e {
                    InviteError::Malformed => {
                        debug!("Client {} sent a malformed invite token", self.handle.id())
                    }
                    _ => info!(
                        "Client {} from {} refused: {}",
                        self.handle.id(),
                        self.handle.peer(),
                        e
                    ),
                }
                self.reject(e.into()).await
            }
        }
    }

    async fn await_username(&mut self) -> Result<State, AppError> {
        self.reply(ServerMessage::UsernamePrompt).await?;
        let Some(raw) = self.read_line().await? else {
            return Ok(State::Closed);
        };

        let username = match validate_username(&raw) {
            Ok(username) => username,
            Err(e) => {
                info!("Client {} sent invalid username: {}", self.handle.id(), e);
                return self.reject(e.into()).await;
            }
        };

        let client = self
            .ctx
            .registry
            .register(self.handle.clone(), username.clone())
            .await?;
        self.registered = Some(client.clone());

        info!(
            "{} joined from {} as client {}",
            username,
            self.handle.peer(),
            self.handle.id()
        );

        self.reply(ServerMessage::Welcome {
            username: username.clone(),
        })
        .await?;
        self.announce(ServerMessage::Joined { username }).await?;

        Ok(State::Relaying(client))
    }

    async fn relay(&mut self, client: Client) -> Result<State, AppError> {
        loop {
            let line = tokio::select! {
                line = self.lines.next() => line,
                _ = self.handle.closed() => {
                    debug!("Client {} closed by server", self.handle.id());
                    return Ok(State::Closed);
                }
            };

            let text = match line {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    debug!("Read error for {}: {}", self.handle.id(), e);
                    return Ok(State::Closed);
                }
                None => return Ok(State::Closed),
            };

            let content = text.trim();
            // Blank lines are not relayed, unlike a bare "[user]: " echo
            if content.is_empty() {
                continue;
            }

            self.announce(ServerMessage::Chat {
                from: client.username.clone(),
                content: content.to_string(),
            })
            .await?;
        }
    }

    /// Send the explanatory line for a failed handshake, then close
    async fn reject(&self, err: AppError) -> Result<State, AppError> {
        let msg = ServerMessage::from(err);
        if let ServerMessage::Error { code, .. } = &msg {
            debug!("Rejecting client {} ({:?})", self.handle.id(), code);
        }
        let _ = self.reply(msg).await;
        Ok(State::Closed)
    }

    /// Read one handshake line; `None` on end of stream
    async fn read_line(&mut self) -> Result<Option<String>, AppError> {
        tokio::select! {
            line = self.lines.next() => Ok(line.transpose()?),
            _ = self.handle.closed() => Ok(None),
        }
    }

    /// Queue a direct reply to this connection
    async fn reply(&self, msg: ServerMessage) -> Result<(), AppError> {
        self.handle
            .send(msg.into_line(), self.ctx.settings.write_timeout)
            .await
            .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))
    }

    /// Broadcast to everyone else
    async fn announce(&self, msg: ServerMessage) -> Result<(), AppError> {
        self.ctx
            .broadcaster
            .broadcast(&msg.into_line(), Some(self.handle.id()))
            .await?;
        Ok(())
    }

    /// Leave the registry, announce the departure and close the socket
    async fn teardown(&mut self, writer: JoinHandle<()>) {
        if let Some(client) = self.registered.take() {
            match self.ctx.registry.unregister(client.id()).await {
                Ok(Some(_)) => {
                    info!(
                        "{} left after {:?} (client {})",
                        client.username,
                        client.session_duration(),
                        client.id()
                    );
                    let left = ServerMessage::Left {
                        username: client.username.clone(),
                    };
                    if let Err(e) = self.announce(left).await {
                        warn!("Leave announcement for {} failed: {}", client.id(), e);
                    }
                }
                // Already dropped by a failed broadcast write
                Ok(None) => info!("{} dropped (client {})", client.username, client.id()),
                Err(e) => error!("Failed to unregister {}: {}", client.id(), e),
            }
        }

        self.handle.close();
        if let Err(e) = writer.await {
            error!("Writer task for {} failed: {}", self.handle.id(), e);
        }
    }
}

/// Spawn the task that owns the write half
///
/// Writes queued lines until the connection is closed, then flushes what is
/// still queued and shuts the socket down. A failed or overdue write closes
/// the connection.
fn spawn_writer(
    write_half: OwnedWriteHalf,
    mut line_rx: mpsc::Receiver<String>,
    closed: CancellationToken,
    write_timeout: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sink = FramedWrite::new(write_half, LinesCodec::new());

        loop {
            let line = tokio::select! {
                biased;
                line = line_rx.recv() => match line {
                    Some(line) => line,
                    None => break,
                },
                _ = closed.cancelled() => break,
            };

            if let Err(e) = write_line(&mut sink, line, write_timeout).await {
                debug!("Socket write failed, ending write task: {}", e);
                closed.cancel();
                return;
            }
        }

        closed.cancel();
        while let Ok(line) = line_rx.try_recv() {
            if write_line(&mut sink, line, write_timeout).await.is_err() {
                return;
            }
        }
        let _ = SinkExt::<String>::close(&mut sink).await;
    })
}

async fn write_line(
    sink: &mut FramedWrite<OwnedWriteHalf, LinesCodec>,
    line: String,
    write_timeout: Option<Duration>,
) -> Result<(), AppError> {
    match write_timeout {
        Some(deadline) => tokio::time::timeout(deadline, sink.send(line))
            .await
            .map_err(|_| {
                AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "write deadline exceeded",
                ))
            })??,
        None => sink.send(line).await?,
    }
    Ok(())
}
