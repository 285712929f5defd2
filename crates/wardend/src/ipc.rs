//! IPC ingress: NDJSON over a Unix domain socket
//!
//! Requests are forwarded to the event loop as [`ServerMessage`]s; the loop
//! replies through [`IpcServer::send_response`] and pushes events to
//! subscribed clients through the broadcast channel. Admin role is granted
//! to root and to the daemon's own user, everyone else observes.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use warden_api::{ClientInfo, ClientRole, Command, Event, Request, Response};
use warden_util::ClientId;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("server error: {0}")]
    ServerError(String),
}

pub type IpcResult<T> = Result<T, IpcError>;

/// Message from a client to the event loop
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

/// IPC server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>,
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Mutex::new(Some(message_rx)),
        }
    }

    /// Bind the socket
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner and group only
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))?;

        info!(path = %self.socket_path.display(), "IPC server listening");

        self.listener = Some(listener);
        Ok(())
    }

    /// Take the receiver for server messages. Single consumer.
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Clone of the event broadcast sender (for components that emit
    /// events outside the main loop)
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Accept connections forever
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("server not started".into()))?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = stream.peer_cred().ok().map(|cred| cred.uid());

                    let own_uid = nix::unistd::getuid().as_raw();
                    let role = match uid {
                        Some(0) => ClientRole::Admin,
                        Some(u) if u == own_uid => ClientRole::Admin,
                        _ => ClientRole::Observer,
                    };

                    let mut info = ClientInfo::new(role);
                    if let Some(u) = uid {
                        info = info.with_uid(u);
                    }

                    info!(client_id = %client_id, uid = ?uid, role = ?role, "Client connected");

                    self.spawn_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn spawn_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id.clone(),
                ClientHandle {
                    info: info.clone(),
                    response_tx,
                    subscribed: false,
                },
            );
        }

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(client_task(
            stream, client_id, clients, message_tx, event_rx, response_rx,
        ));
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let json = serde_json::to_string(&response)?;

        let clients = self.clients.read().await;
        if let Some(handle) = clients.get(client_id) {
            handle
                .response_tx
                .send(json)
                .map_err(|_| IpcError::ConnectionClosed)?;
        }

        Ok(())
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get client info
    pub async fn client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        self.clients.read().await.get(client_id).map(|h| h.info.clone())
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Per-client task: reads requests, writes responses and subscribed events.
async fn client_task(
    stream: UnixStream,
    client_id: ClientId,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    mut event_rx: broadcast::Receiver<Event>,
    mut response_rx: mpsc::UnboundedReceiver<String>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Request>(line) {
                            Ok(request) => {
                                if matches!(request.command, Command::SubscribeEvents) {
                                    let mut clients = clients.write().await;
                                    if let Some(handle) = clients.get_mut(&client_id) {
                                        handle.subscribed = true;
                                    }
                                }
                                let _ = message_tx.send(ServerMessage::Request {
                                    client_id: client_id.clone(),
                                    request,
                                });
                            }
                            Err(e) => {
                                warn!(client_id = %client_id, error = %e, "Invalid request");
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(client_id = %client_id, "Client disconnected (EOF)");
                        break;
                    }
                    Err(e) => {
                        debug!(client_id = %client_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            Some(response) = response_rx.recv() => {
                let mut message = response;
                message.push('\n');
                if let Err(e) = write_half.write_all(message.as_bytes()).await {
                    debug!(client_id = %client_id, error = %e, "Write error");
                    break;
                }
            }

            event = event_rx.recv() => {
                let Ok(event) = event else { continue };
                let subscribed = clients
                    .read()
                    .await
                    .get(&client_id)
                    .map(|handle| handle.subscribed)
                    .unwrap_or(false);
                if !subscribed {
                    continue;
                }
                if let Ok(json) = serde_json::to_string(&event) {
                    let mut message = json;
                    message.push('\n');
                    if let Err(e) = write_half.write_all(message.as_bytes()).await {
                        debug!(client_id = %client_id, error = %e, "Event write error");
                        break;
                    }
                }
            }
        }
    }

    let _ = message_tx.send(ServerMessage::ClientDisconnected {
        client_id: client_id.clone(),
    });
    clients.write().await.remove(&client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn server_binds_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();

        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn message_receiver_is_single_consumer() {
        let dir = tempdir().unwrap();
        let server = IpcServer::new(dir.path().join("test.sock"));

        assert!(server.take_message_receiver().await.is_some());
        assert!(server.take_message_receiver().await.is_none());
    }
}
