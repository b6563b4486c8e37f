//! WebSocket Chat Server
//!
//! Async WebSocket server for chat connections. Each socket gets a reader task
//! running the connection state machine and a writer task draining the
//! connection's outbound queue, so no socket I/O ever happens under the
//! registry lock.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

use crate::chat::admin::AdminError;
use crate::chat::hub::{ChatHub, HubConfig, JoinError};
use crate::chat::registry::{AdmitError, ConnectionHandle, SessionInfo};
use crate::chat::relay::{RelayConfig, SubmitError};
use crate::chat::watchdog::WatchdogConfig;
use crate::core::ban::{BanTarget, CloseReason};
use crate::core::identity::AccountId;
use crate::network::protocol::{ClientMessage, ErrorCode, RejectReason, ServerMessage};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time a fresh socket has to send `join`.
    pub join_timeout: Duration,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// How long a closing connection may take to flush queued frames.
    pub flush_timeout: Duration,
    /// Interval of the housekeeping loop (expired ban pruning).
    pub cleanup_interval: Duration,
    /// Chat core settings.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            join_timeout: Duration::from_secs(10),
            outbound_buffer: 256,
            flush_timeout: Duration::from_secs(2),
            cleanup_interval: Duration::from_secs(60),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ChatServerError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: env_or("CHAT_BIND_ADDR", defaults.bind_addr)?,
            max_connections: env_or("CHAT_MAX_CONNECTIONS", defaults.max_connections)?,
            join_timeout: Duration::from_secs(env_or(
                "CHAT_JOIN_TIMEOUT_SECS",
                defaults.join_timeout.as_secs(),
            )?),
            outbound_buffer: env_or("CHAT_OUTBOUND_BUFFER", defaults.outbound_buffer)?.max(1),
            flush_timeout: defaults.flush_timeout,
            cleanup_interval: defaults.cleanup_interval,
            hub: HubConfig {
                relay: RelayConfig {
                    history_limit: env_or("CHAT_HISTORY_LIMIT", defaults.hub.relay.history_limit)?,
                    max_message_len: env_or(
                        "CHAT_MAX_MESSAGE_LEN",
                        defaults.hub.relay.max_message_len,
                    )?,
                    persist_queue: defaults.hub.relay.persist_queue,
                },
                watchdog: WatchdogConfig {
                    sweep_interval: Duration::from_secs(
                        env_or(
                            "CHAT_SWEEP_INTERVAL_SECS",
                            defaults.hub.watchdog.sweep_interval.as_secs(),
                        )?
                        .max(1),
                    ),
                },
            },
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ChatServerError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ChatServerError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Chat server errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// What woke the connection task.
enum Event {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Closed(Option<CloseReason>),
    JoinTimeout,
    Shutdown,
}

/// Whether the connection task keeps going after handling a command.
enum Flow {
    Continue,
    Close,
}

/// Per-connection state.
struct Connection {
    addr: SocketAddr,
    origin: String,
    handle: ConnectionHandle,
    tx: mpsc::Sender<ServerMessage>,
    /// Set once joined.
    session: Option<SessionInfo>,
    closed: Option<oneshot::Receiver<CloseReason>>,
}

impl Connection {
    async fn send(&self, message: ServerMessage) {
        if self.tx.send(message).await.is_err() {
            debug!(addr = %self.addr, "Writer gone, reply dropped");
        }
    }
}

/// The chat server.
pub struct ChatServer {
    /// Server configuration.
    config: ServerConfig,
    /// Chat core.
    hub: Arc<ChatHub>,
    /// Open sockets.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl ChatServer {
    /// Create a new chat server.
    pub fn new(config: ServerConfig, hub: Arc<ChatHub>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            hub,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind and run the server.
    pub async fn run(&self) -> Result<(), ChatServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ChatServerError> {
        info!("Chat server listening on {}", listener.local_addr()?);

        let watchdog_handle = tokio::spawn(
            self.hub
                .watchdog()
                .clone()
                .run(self.shutdown_tx.subscribe()),
        );

        let cleanup_hub = self.hub.clone();
        let cleanup_every = self.config.cleanup_interval;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_hub, cleanup_every).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        let _ = watchdog_handle.await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = self.hub.clone();
        let config = self.config.clone();
        let connections = self.connections.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => Self::run_connection(ws, addr, hub, config, shutdown_rx).await,
                Err(e) => debug!("WebSocket handshake failed for {}: {}", addr, e),
            }
            connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Connection state machine: pending until `join`, then active until the
    /// socket closes, the registry drops the session, or the server stops.
    async fn run_connection(
        ws: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        hub: Arc<ChatHub>,
        config: ServerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let (ws_sender, mut ws_receiver) = ws.split();
        let (tx, rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);
        let writer = tokio::spawn(Self::write_loop(ws_sender, rx));
        let writer_abort = writer.abort_handle();

        let mut conn = Connection {
            addr,
            origin: addr.ip().to_canonical().to_string(),
            handle: ConnectionHandle::new(tx.clone()),
            tx,
            session: None,
            closed: None,
        };

        let join_deadline = sleep(config.join_timeout);
        tokio::pin!(join_deadline);

        loop {
            let event = tokio::select! {
                frame = ws_receiver.next() => Event::Frame(frame),
                reason = wait_closed(&mut conn.closed) => Event::Closed(reason),
                _ = &mut join_deadline, if conn.session.is_none() => Event::JoinTimeout,
                _ = shutdown_rx.recv() => Event::Shutdown,
            };

            let flow = match event {
                Event::Frame(Some(Ok(Message::Text(text)))) => {
                    match ClientMessage::from_json(&text) {
                        Ok(msg) => Self::handle_client_message(&mut conn, msg, &hub).await,
                        Err(e) => Self::reject_frame(&conn, e).await,
                    }
                }
                Event::Frame(Some(Ok(Message::Binary(data)))) => {
                    match ClientMessage::from_bytes(&data) {
                        Ok(msg) => Self::handle_client_message(&mut conn, msg, &hub).await,
                        Err(e) => Self::reject_frame(&conn, e).await,
                    }
                }
                Event::Frame(Some(Ok(Message::Close(_)))) | Event::Frame(None) => {
                    debug!("Client {} disconnected", addr);
                    Flow::Close
                }
                Event::Frame(Some(Err(e))) => {
                    debug!("WebSocket error for {}: {}", addr, e);
                    Flow::Close
                }
                Event::Frame(Some(Ok(_))) => Flow::Continue,
                Event::Closed(reason) => {
                    debug!(addr = %addr, reason = ?reason, "Session closed by server");
                    // The registry no longer holds this session.
                    conn.session = None;
                    Flow::Close
                }
                Event::JoinTimeout => {
                    debug!("Client {} did not join in time", addr);
                    Flow::Close
                }
                Event::Shutdown => {
                    conn.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    })
                    .await;
                    Flow::Close
                }
            };

            if let Flow::Close = flow {
                break;
            }
        }

        // Cleanup
        if let Some(session) = conn.session.take() {
            hub.leave(session.connection_id).await;
        }

        // Dropping the last senders lets the writer flush and close.
        drop(conn);
        if timeout(config.flush_timeout, writer).await.is_err() {
            debug!("Writer for {} did not flush in time", addr);
            writer_abort.abort();
        }

        debug!("Client {} cleaned up", addr);
    }

    async fn reject_frame(conn: &Connection, err: serde_json::Error) -> Flow {
        debug!("Invalid message from {}: {}", conn.addr, err);
        conn.send(ServerMessage::error(
            ErrorCode::InvalidInput,
            "Invalid message format",
        ))
        .await;
        Flow::Continue
    }

    /// Drain the outbound queue into the socket.
    async fn write_loop(mut ws_sender: WsSink, mut rx: mpsc::Receiver<ServerMessage>) {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(text)).await {
                debug!("Send failed: {}", e);
                return;
            }
            if msg.is_terminal() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    }

    /// Handle a client message.
    async fn handle_client_message(conn: &mut Connection, msg: ClientMessage, hub: &ChatHub) -> Flow {
        match msg {
            ClientMessage::Join { token } => Self::handle_join(conn, &token, hub).await,
            ClientMessage::Ping { timestamp } => {
                conn.send(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                })
                .await;
                Flow::Continue
            }
            other => {
                let Some(session) = conn.session.clone() else {
                    conn.send(ServerMessage::error(ErrorCode::NotJoined, "Must join first"))
                        .await;
                    return Flow::Continue;
                };
                match other {
                    ClientMessage::SendMessage { body } => {
                        Self::handle_send(conn, &session, &body, hub).await
                    }
                    ClientMessage::BanAccount {
                        account_id,
                        reason,
                        duration_minutes,
                    } => {
                        let target = BanTarget::Account(AccountId::new(account_id));
                        let result = hub
                            .admin()
                            .ban(&session.identity, target, &reason, duration_minutes)
                            .await;
                        Self::reply_admin(conn, result).await
                    }
                    ClientMessage::BanAddress {
                        address,
                        reason,
                        duration_minutes,
                    } => {
                        let target = BanTarget::Address(address);
                        let result = hub
                            .admin()
                            .ban(&session.identity, target, &reason, duration_minutes)
                            .await;
                        Self::reply_admin(conn, result).await
                    }
                    ClientMessage::Unban { target } => {
                        let result = match hub.admin().unban(&session.identity, target).await {
                            Ok(true) => Ok(0),
                            Ok(false) => Err(AdminError::InvalidTarget("no such ban".into())),
                            Err(e) => Err(e),
                        };
                        Self::reply_admin(conn, result).await
                    }
                    ClientMessage::Join { .. } | ClientMessage::Ping { .. } => Flow::Continue,
                }
            }
        }
    }

    /// Handle a join request.
    async fn handle_join(conn: &mut Connection, token: &str, hub: &ChatHub) -> Flow {
        if conn.session.is_some() {
            conn.send(ServerMessage::error(ErrorCode::InvalidInput, "Already joined"))
                .await;
            return Flow::Continue;
        }

        match hub.join(token, conn.handle.clone(), &conn.origin).await {
            Ok(admission) => {
                info!(
                    addr = %conn.addr,
                    conn = %admission.info.connection_id,
                    account = %admission.info.identity.account_id,
                    "Client joined"
                );
                conn.session = Some(admission.info);
                conn.closed = Some(admission.closed);
                Flow::Continue
            }
            Err(JoinError::InvalidCredential(e)) => {
                debug!("Join from {} rejected: {}", conn.addr, e);
                conn.send(ServerMessage::JoinRejected {
                    reason: RejectReason::InvalidCredential,
                    detail: None,
                })
                .await;
                Flow::Close
            }
            Err(JoinError::Admit(AdmitError::AlreadyBanned(detail))) => {
                conn.send(ServerMessage::JoinRejected {
                    reason: RejectReason::Banned,
                    detail: Some(detail),
                })
                .await;
                Flow::Close
            }
            Err(JoinError::Admit(AdmitError::AlreadyJoined)) => {
                conn.send(ServerMessage::error(ErrorCode::InvalidInput, "Already joined"))
                    .await;
                Flow::Continue
            }
        }
    }

    /// Handle a chat message.
    async fn handle_send(conn: &Connection, session: &SessionInfo, body: &str, hub: &ChatHub) -> Flow {
        match hub.submit(session, body).await {
            Ok(_) => Flow::Continue,
            Err(SubmitError::EmptyMessage) => Flow::Continue,
            Err(e @ SubmitError::TooLong { .. }) => {
                conn.send(ServerMessage::error(ErrorCode::MessageRejected, e.to_string()))
                    .await;
                Flow::Continue
            }
            // Evicted between the last frame and this one.
            Err(SubmitError::NotJoined) => Flow::Close,
        }
    }

    async fn reply_admin(conn: &Connection, result: Result<usize, AdminError>) -> Flow {
        let reply = match result {
            Ok(evicted) => ServerMessage::AdminResult {
                ok: true,
                evicted,
                error: None,
            },
            Err(AdminError::NotAuthorized) => {
                ServerMessage::error(ErrorCode::NotAuthorized, "Admin rights required")
            }
            Err(e) => ServerMessage::AdminResult {
                ok: false,
                evicted: 0,
                error: Some(e.to_string()),
            },
        };
        conn.send(reply).await;
        Flow::Continue
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(hub: Arc<ChatHub>, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;
            let pruned = hub.prune_bans().await;
            if pruned > 0 {
                info!(pruned, "Pruned expired bans");
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get open socket count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Chat core.
    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }
}

/// Resolve when the registry lets go of the session; never while pending.
async fn wait_closed(closed: &mut Option<oneshot::Receiver<CloseReason>>) -> Option<CloseReason> {
    match closed {
        Some(rx) => rx.await.ok(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::bans::InMemoryBanDirectory;
    use crate::directory::identity::JwtIdentityProvider;
    use crate::directory::store::InMemoryMessageStore;
    use crate::network::auth::tests::{create_test_token, test_claims, SECRET};
    use crate::network::auth::AuthConfig;
    use crate::network::protocol::DisconnectReason;
    use tokio_tungstenite::{connect_async, MaybeTlsStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn test_hub() -> Arc<ChatHub> {
        Arc::new(ChatHub::new(
            Arc::new(JwtIdentityProvider::new(AuthConfig::with_secret(SECRET))),
            Arc::new(InMemoryBanDirectory::new()),
            Arc::new(InMemoryMessageStore::default()),
            HubConfig::default(),
        ))
    }

    async fn start() -> (Arc<ChatServer>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let config = ServerConfig {
            join_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let server = Arc::new(ChatServer::new(config, test_hub()));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, url)
    }

    async fn send(ws: &mut Client, msg: &ClientMessage) {
        ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
    }

    /// Next server frame; `None` once the socket closed.
    async fn recv(ws: &mut Client) -> Option<ServerMessage> {
        loop {
            let frame = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for frame");
            match frame {
                Some(Ok(Message::Text(text))) => return Some(ServerMessage::from_json(&text).unwrap()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn recv_until<F>(ws: &mut Client, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let msg = recv(ws).await.expect("socket closed early");
            if pred(&msg) {
                return msg;
            }
        }
    }

    async fn join(url: &str, account: &str, admin: bool) -> Client {
        let (mut ws, _) = connect_async(url).await.unwrap();
        let token = create_test_token(&test_claims(account, Some(account), admin), SECRET);
        send(&mut ws, &ClientMessage::Join { token }).await;
        assert!(matches!(recv(&mut ws).await, Some(ServerMessage::Joined { .. })));
        assert!(matches!(recv(&mut ws).await, Some(ServerMessage::RecentMessages { .. })));
        ws
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.hub.relay.history_limit, 50);
        assert_eq!(config.hub.watchdog.sweep_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = ChatServer::new(ServerConfig::default(), test_hub());
        assert_eq!(server.connection_count(), 0);
        assert!(server.hub().registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_token_rejected_and_closed() {
        let (_server, url) = start().await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send(&mut ws, &ClientMessage::Join { token: "nope".into() }).await;
        assert_eq!(
            recv(&mut ws).await,
            Some(ServerMessage::JoinRejected {
                reason: RejectReason::InvalidCredential,
                detail: None,
            })
        );
        assert_eq!(recv(&mut ws).await, None);
    }

    #[tokio::test]
    async fn test_message_before_join_is_refused() {
        let (_server, url) = start().await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send(&mut ws, &ClientMessage::SendMessage { body: "hi".into() }).await;
        assert!(matches!(
            recv(&mut ws).await,
            Some(ServerMessage::Error(e)) if e.code == ErrorCode::NotJoined
        ));
    }

    #[tokio::test]
    async fn test_join_timeout_closes_socket() {
        let (_server, url) = start().await;
        let (mut ws, _) = connect_async(&url).await.unwrap();
        assert_eq!(recv(&mut ws).await, None);
    }

    #[tokio::test]
    async fn test_chat_roundtrip_between_clients() {
        let (_server, url) = start().await;
        let mut ana = join(&url, "ana", false).await;
        let mut bob = join(&url, "bob", false).await;

        // Ana sees Bob arrive.
        recv_until(&mut ana, |m| matches!(m, ServerMessage::Presence { users } if users.len() == 2)).await;

        send(&mut ana, &ClientMessage::SendMessage { body: "   ".into() }).await;
        send(&mut ana, &ClientMessage::SendMessage { body: "hello bob".into() }).await;

        let got = recv_until(&mut bob, |m| matches!(m, ServerMessage::NewMessage { .. })).await;
        match got {
            ServerMessage::NewMessage { message } => {
                assert_eq!(message.body, "hello bob");
                assert_eq!(message.display_name, "ana");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_admin_ban_disconnects_live_session() {
        let (server, url) = start().await;
        let mut root = join(&url, "root", true).await;
        let mut ana = join(&url, "ana", false).await;

        send(
            &mut root,
            &ClientMessage::BanAccount {
                account_id: "ana".into(),
                reason: "spam".into(),
                duration_minutes: Some(10),
            },
        )
        .await;

        let kicked = recv_until(&mut ana, |m| matches!(m, ServerMessage::ForcedDisconnect { .. })).await;
        match kicked {
            ServerMessage::ForcedDisconnect { reason, detail } => {
                assert_eq!(reason, DisconnectReason::Banned);
                let detail = detail.unwrap();
                assert_eq!(detail.reason, "spam");
                assert!(detail.expires_at.is_some());
            }
            _ => unreachable!(),
        }
        assert_eq!(recv(&mut ana).await, None);

        let result = recv_until(&mut root, |m| matches!(m, ServerMessage::AdminResult { .. })).await;
        assert!(matches!(result, ServerMessage::AdminResult { ok: true, evicted: 1, .. }));
        assert!(!server.hub().registry().contains_account(&"ana".into()).await);

        // Rejoining is refused with the ban detail.
        let (mut again, _) = connect_async(&url).await.unwrap();
        let token = create_test_token(&test_claims("ana", Some("ana"), false), SECRET);
        send(&mut again, &ClientMessage::Join { token }).await;
        assert!(matches!(
            recv(&mut again).await,
            Some(ServerMessage::JoinRejected { reason: RejectReason::Banned, detail: Some(_) })
        ));
    }

    #[tokio::test]
    async fn test_non_admin_ban_refused() {
        let (_server, url) = start().await;
        let mut ana = join(&url, "ana", false).await;

        send(
            &mut ana,
            &ClientMessage::BanAddress {
                address: "127.0.0.1".into(),
                reason: "x".into(),
                duration_minutes: None,
            },
        )
        .await;

        let reply = recv_until(&mut ana, |m| matches!(m, ServerMessage::Error(_))).await;
        assert!(matches!(reply, ServerMessage::Error(e) if e.code == ErrorCode::NotAuthorized));
    }

    #[tokio::test]
    async fn test_second_login_supersedes() {
        let (_server, url) = start().await;
        let mut first = join(&url, "ana", false).await;
        let _second = join(&url, "ana", false).await;

        let kicked = recv_until(&mut first, |m| matches!(m, ServerMessage::ForcedDisconnect { .. })).await;
        assert!(matches!(
            kicked,
            ServerMessage::ForcedDisconnect { reason: DisconnectReason::Superseded, detail: None }
        ));
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let (server, url) = start().await;
        let mut ana = join(&url, "ana", false).await;

        server.shutdown();
        let msg = recv_until(&mut ana, |m| matches!(m, ServerMessage::Shutdown { .. })).await;
        assert!(msg.is_terminal());
    }
}
