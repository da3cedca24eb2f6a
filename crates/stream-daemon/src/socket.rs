//! TCP control server.
//!
//! A client gets a `Hello` with the full state as soon as it connects and
//! then every broadcast.  Commands arrive as length-prefixed JSON frames and
//! are forwarded to the core one by one, in order.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stream_proto::protocol::{Broadcast, Message, PROTOCOL_VERSION};
use stream_proto::state::StateManager;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::core::DaemonEvent;
use crate::BroadcastMessage;

const HEADER_LEN: usize = 4;

/// Reassembles length-prefixed frames out of a byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame as a message.  Frames that do not decode are
    /// dropped so one bad frame cannot wedge the connection.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let header = self.buf.get(..HEADER_LEN)?;
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let frame_len = HEADER_LEN + len;
            if self.buf.len() < frame_len {
                return None;
            }

            let decoded = Message::decode(&self.buf[..frame_len]);
            self.buf.drain(..frame_len);
            match decoded {
                Ok((message, _)) => return Some(message),
                Err(e) => warn!("Dropping malformed frame ({} bytes): {}", len, e),
            }
        }
    }
}

/// Wire bytes for one broadcast.  State updates carry a fresh snapshot.
pub async fn encode_broadcast(
    message: BroadcastMessage,
    state_manager: &StateManager,
) -> anyhow::Result<Vec<u8>> {
    let broadcast = match message {
        BroadcastMessage::StateUpdated => Broadcast::State {
            data: state_manager.get_state().await,
        },
        BroadcastMessage::MetadataUpdated(data) => Broadcast::Metadata { data },
        BroadcastMessage::Log(message) => Broadcast::Log { message },
        BroadcastMessage::Error(message) => Broadcast::Error { message },
    };
    Message::Broadcast(broadcast).encode()
}

async fn encode_hello(state_manager: &StateManager) -> anyhow::Result<Vec<u8>> {
    let state = state_manager.get_state().await;
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        daemon_rev: state.rev,
        state,
    })
    .encode()
}

pub struct ControlServer {
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    connected: Arc<AtomicUsize>,
}

impl ControlServer {
    pub fn new(
        state_manager: Arc<StateManager>,
        event_tx: mpsc::Sender<DaemonEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            state_manager,
            event_tx,
            broadcast_tx,
            connected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared count of connected clients.
    pub fn connected(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connected)
    }

    /// Accept clients forever, one task per connection.
    pub async fn serve(self, listener: TcpListener) {
        let mut next_id = 0usize;
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            next_id += 1;
            let session = Session {
                id: next_id,
                state_manager: Arc::clone(&self.state_manager),
                event_tx: self.event_tx.clone(),
                broadcast_rx: self.broadcast_tx.subscribe(),
            };
            let connected = Arc::clone(&self.connected);
            let count = connected.fetch_add(1, Ordering::SeqCst) + 1;
            info!("Client {} connected from {} ({} connected)", next_id, peer, count);

            tokio::spawn(async move {
                let id = session.id;
                if let Err(e) = session.run(stream).await {
                    debug!("Client {} session ended: {}", id, e);
                }
                let count = connected.fetch_sub(1, Ordering::SeqCst) - 1;
                info!("Client {} disconnected ({} connected)", id, count);
            });
        }
    }
}

struct Session {
    id: usize,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_rx: broadcast::Receiver<BroadcastMessage>,
}

impl Session {
    async fn run(mut self, stream: TcpStream) -> anyhow::Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        writer.write_all(&encode_hello(&self.state_manager).await?).await?;

        let mut frames = FrameBuffer::default();
        let mut chunk = [0u8; 4096];
        loop {
            tokio::select! {
                read = reader.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        info!("Client {} closed connection", self.id);
                        return Ok(());
                    }
                    frames.extend(&chunk[..n]);
                    while let Some(message) = frames.next_message() {
                        self.dispatch(message).await?;
                    }
                }
                received = self.broadcast_rx.recv() => {
                    let bytes = match received {
                        Ok(message) => encode_broadcast(message, &self.state_manager).await?,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Client {} missed {} broadcasts, resending state", self.id, n);
                            encode_broadcast(BroadcastMessage::StateUpdated, &self.state_manager).await?
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    };
                    writer.write_all(&bytes).await?;
                }
            }
        }
    }

    async fn dispatch(&self, message: Message) -> anyhow::Result<()> {
        match message {
            Message::Command(cmd) => {
                info!("Client {} sent command: {:?}", self.id, cmd);
                self.event_tx
                    .send(DaemonEvent::ClientCommand(cmd))
                    .await
                    .map_err(|_| anyhow::anyhow!("daemon event channel closed"))
            }
            Message::Broadcast(b) => {
                debug!("Client {} sent a broadcast, ignoring: {:?}", self.id, b);
                Ok(())
            }
        }
    }
}
