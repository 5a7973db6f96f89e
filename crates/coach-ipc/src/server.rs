//! IPC server implementation

use coach_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, Request, Response,
    ResponsePayload, ResponseResult,
};
use coach_util::ClientId;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Buffered events per client before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Message from client to server
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

/// IPC Server
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::UnboundedSender<ServerMessage>,
    message_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>>,
}

struct ClientHandle {
    info: ClientInfo,
    response_tx: mpsc::UnboundedSender<Outgoing>,
    subscribed: bool,
}

/// A serialized response queued for a client's writer
struct Outgoing {
    line: String,
    /// Start forwarding events once this line is on the wire
    subscribes: bool,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            message_tx,
            message_rx: Arc::new(Mutex::new(Some(message_rx))),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Start listening
    pub async fn start(&mut self) -> IpcResult<()> {
        // Stale socket from a previous run
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

    /// Get receiver for server messages. Only the first call gets it.
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.message_rx.lock().await.take()
    }

    /// Accept connections in a loop
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| IpcError::ServerError("Server not started".into()))?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = ClientId::new();
                    let uid = get_peer_uid(&stream);
                    let role = role_for_uid(uid);

                    let info = ClientInfo::new(role);
                    let info = match uid {
                        Some(u) => info.with_uid(u),
                        None => info,
                    };
                    let info = ClientInfo {
                        client_id: client_id.clone(),
                        ..info
                    };

                    info!(client_id = %client_id, uid = ?uid, role = ?role, "Client connected");

                    self.handle_client(stream, client_id, info).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_client(&self, stream: UnixStream, client_id: ClientId, info: ClientInfo) {
        let (read_half, write_half) = stream.into_split();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<Outgoing>();

        {
            let mut clients = self.clients.write().await;
            clients.insert(
                client_id.clone(),
                ClientHandle {
                    info: info.clone(),
                    response_tx: response_tx.clone(),
                    subscribed: false,
                },
            );
        }

        let _ = self.message_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        // Reader: parse requests, forward them, clean up on EOF
        let clients = self.clients.clone();
        let message_tx = self.message_tx.clone();
        let reader_id = client_id.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(client_id = %reader_id, "Client disconnected (EOF)");
                        break;
                    }
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<Request>(line) {
                            Ok(request) => {
                                // Subscribing waits for the writer, see below
                                if matches!(request.command, Command::UnsubscribeEvents) {
                                    let mut clients = clients.write().await;
                                    if let Some(handle) = clients.get_mut(&reader_id) {
                                        handle.subscribed = false;
                                    }
                                }

                                let _ = message_tx.send(ServerMessage::Request {
                                    client_id: reader_id.clone(),
                                    request,
                                });
                            }
                            Err(e) => {
                                warn!(client_id = %reader_id, error = %e, "Invalid request");

                                let response = Response::error(
                                    0,
                                    ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()),
                                );
                                if let Ok(line) = serde_json::to_string(&response) {
                                    let _ = response_tx.send(Outgoing {
                                        line,
                                        subscribes: false,
                                    });
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(client_id = %reader_id, error = %e, "Read error");
                        break;
                    }
                }
            }

            // Dropping the handle closes the writer's response channel
            clients.write().await.remove(&reader_id);
            let _ = message_tx.send(ServerMessage::ClientDisconnected {
                client_id: reader_id,
            });
        });

        // Writer: responses plus events for subscribed clients
        let mut event_rx = self.event_tx.subscribe();
        let clients = self.clients.clone();
        let writer_id = client_id;

        tokio::spawn(async move {
            let mut writer = write_half;

            loop {
                tokio::select! {
                    response = response_rx.recv() => {
                        let Some(Outgoing { mut line, subscribes }) = response else {
                            break;
                        };
                        line.push('\n');
                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            debug!(client_id = %writer_id, error = %e, "Write error");
                            break;
                        }

                        // Events only after the client has seen its Subscribed response
                        if subscribes {
                            let mut clients = clients.write().await;
                            if let Some(handle) = clients.get_mut(&writer_id) {
                                handle.subscribed = true;
                            }
                        }
                    }

                    event = event_rx.recv() => {
                        let event = match event {
                            Ok(event) => event,
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(client_id = %writer_id, skipped, "Client lagging, events dropped");
                                continue;
                            }
                            Err(RecvError::Closed) => break,
                        };

                        let is_subscribed = {
                            let clients = clients.read().await;
                            clients.get(&writer_id).is_some_and(|h| h.subscribed)
                        };

                        if is_subscribed && let Ok(mut msg) = serde_json::to_string(&event) {
                            msg.push('\n');
                            if let Err(e) = writer.write_all(msg.as_bytes()).await {
                                debug!(client_id = %writer_id, error = %e, "Event write error");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Send a response to a specific client
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let line = serde_json::to_string(&response)?;
        let subscribes = matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::Subscribed { .. })
        );

        let clients = self.clients.read().await;
        let handle = clients.get(client_id).ok_or(IpcError::ConnectionClosed)?;
        handle
            .response_tx
            .send(Outgoing { line, subscribes })
            .map_err(|_| IpcError::ConnectionClosed)
    }

    /// Broadcast an event to all subscribed clients
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get client info
    pub async fn get_client_info(&self, client_id: &ClientId) -> Option<ClientInfo> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|h| h.info.clone())
    }

    /// Get connected client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
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

/// Role granted to a peer.
///
/// Root and the service's own user administer; other local users act as
/// members. Peers without credentials are read-only.
pub fn role_for_uid(uid: Option<u32>) -> ClientRole {
    match uid {
        Some(0) => ClientRole::Admin,
        Some(u) if u == nix::unistd::getuid().as_raw() => ClientRole::Admin,
        Some(_) => ClientRole::Member,
        None => ClientRole::Observer,
    }
}

/// Get peer UID from Unix socket
fn get_peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();

    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(cred) => Some(cred.uid()),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IpcClient;
    use coach_api::EventPayload;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn started_server(socket_path: &Path) -> Arc<IpcServer> {
        let mut server = IpcServer::new(socket_path);
        server.start().await.unwrap();
        let server = Arc::new(server);

        let accept = server.clone();
        tokio::spawn(async move {
            let _ = accept.run().await;
        });

        server
    }

    /// Answers Ping and SubscribeEvents like the daemon would
    fn spawn_responder(server: Arc<IpcServer>, messages: mpsc::UnboundedReceiver<ServerMessage>) {
        spawn_slow_responder(server, messages, Duration::ZERO);
    }

    /// Responder that takes `delay` per request, like a daemon waiting on its engine lock
    fn spawn_slow_responder(
        server: Arc<IpcServer>,
        mut messages: mpsc::UnboundedReceiver<ServerMessage>,
        delay: Duration,
    ) {
        tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                if let ServerMessage::Request { client_id, request } = msg {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let payload = match request.command {
                        Command::SubscribeEvents => ResponsePayload::Subscribed {
                            client_id: client_id.clone(),
                        },
                        _ => ResponsePayload::Pong,
                    };
                    let _ = server
                        .send_response(&client_id, Response::success(request.request_id, payload))
                        .await;
                }
            }
        });
    }

    #[tokio::test]
    async fn test_server_start() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();

        assert!(socket_path.exists());
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);
    }

    #[tokio::test]
    async fn message_receiver_is_taken_once() {
        let server = IpcServer::new("/nonexistent/coachd.sock");
        assert!(server.take_message_receiver().await.is_some());
        assert!(server.take_message_receiver().await.is_none());
    }

    #[tokio::test]
    async fn run_requires_start() {
        let server = IpcServer::new("/nonexistent/coachd.sock");
        assert!(matches!(server.run().await, Err(IpcError::ServerError(_))));
    }

    #[tokio::test]
    async fn ping_round_trip() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("coachd.sock");
        let server = started_server(&socket_path).await;
        let messages = server.take_message_receiver().await.unwrap();
        spawn_responder(server.clone(), messages);

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let first = client.send(Command::Ping).await.unwrap();
        let second = client.send(Command::Ping).await.unwrap();

        assert_eq!(first.request_id, 1);
        assert_eq!(second.request_id, 2);
        assert!(matches!(
            second.result,
            ResponseResult::Ok(ResponsePayload::Pong)
        ));
    }

    #[tokio::test]
    async fn invalid_request_gets_error_response() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("coachd.sock");
        let _server = started_server(&socket_path).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"not json\n").await.unwrap();

        let mut line = String::new();
        BufReader::new(read_half).read_line(&mut line).await.unwrap();
        let response: Response = serde_json::from_str(line.trim()).unwrap();

        match response.result {
            ResponseResult::Err(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscribed_clients_receive_events() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("coachd.sock");
        let server = started_server(&socket_path).await;
        let messages = server.take_message_receiver().await.unwrap();
        spawn_responder(server.clone(), messages);

        let client = IpcClient::connect(&socket_path).await.unwrap();
        let mut events = client.subscribe().await.unwrap();

        server.broadcast_event(Event::new(EventPayload::PolicyReloaded {
            cancellation_window_hours: 4,
        }));

        let event = events.next().await.unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::PolicyReloaded {
                cancellation_window_hours: 4
            }
        ));
    }

    #[tokio::test]
    async fn subscribe_succeeds_while_events_are_flowing() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("coachd.sock");
        let server = started_server(&socket_path).await;
        let messages = server.take_message_receiver().await.unwrap();
        spawn_slow_responder(server.clone(), messages, Duration::from_millis(5));

        let broadcaster = server.clone();
        let ticker = tokio::spawn(async move {
            loop {
                broadcaster.broadcast_event(Event::new(EventPayload::PolicyReloaded {
                    cancellation_window_hours: 2,
                }));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let mut streams = Vec::new();
        for _ in 0..20 {
            let client = IpcClient::connect(&socket_path).await.unwrap();
            streams.push(client.subscribe().await.unwrap());
        }

        for stream in &mut streams {
            let event = stream.next().await.unwrap();
            assert!(matches!(
                event.payload,
                EventPayload::PolicyReloaded {
                    cancellation_window_hours: 2
                }
            ));
        }

        ticker.abort();
    }

    #[tokio::test]
    async fn unsubscribed_clients_get_only_responses() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("coachd.sock");
        let server = started_server(&socket_path).await;
        let messages = server.take_message_receiver().await.unwrap();
        spawn_responder(server.clone(), messages);

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        client.send(Command::Ping).await.unwrap();

        server.broadcast_event(Event::new(EventPayload::PolicyReloaded {
            cancellation_window_hours: 4,
        }));

        let response = client.send(Command::Ping).await.unwrap();
        assert_eq!(response.request_id, 2);
    }

    #[tokio::test]
    async fn local_connections_are_admin() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("coachd.sock");
        let server = started_server(&socket_path).await;
        let mut messages = server.take_message_receiver().await.unwrap();

        let _client = IpcClient::connect(&socket_path).await.unwrap();

        match messages.recv().await {
            Some(ServerMessage::ClientConnected { client_id, info }) => {
                assert_eq!(info.client_id, client_id);
                assert_eq!(info.role, ClientRole::Admin);
                assert_eq!(info.uid, Some(nix::unistd::getuid().as_raw()));
            }
            _ => panic!("expected ClientConnected"),
        }
    }

    #[test]
    fn roles_by_uid() {
        assert_eq!(role_for_uid(Some(0)), ClientRole::Admin);
        assert_eq!(
            role_for_uid(Some(nix::unistd::getuid().as_raw())),
            ClientRole::Admin
        );
        assert_eq!(role_for_uid(None), ClientRole::Observer);
    }
}
