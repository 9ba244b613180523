//! WebSocket transport, registration, and liveness reaping
//!
//! Everything in here is a thin collaborator around the handler: it accepts
//! upgrades, binds an identity per connection, pumps decoded envelopes into
//! [`MessageHandler::handle`], and tears the registration down again when the
//! socket goes away.
//!
//! Identity assignment: the client supplies `?id=...` on the upgrade request,
//! or gets a fresh UUIDv4. A second connection for an identity that is still
//! bound is refused and closed; the existing binding survives.

use crate::client::{Client, Outbound, Socket};
use crate::error::{ClientRequestError, SendError};
use crate::handler::MessageHandler;
use crate::message::{Message, PeerId};
use crate::realm::Realm;
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// A client whose last heartbeat is older than this is reaped
    pub heartbeat_timeout: Duration,
    /// How often the reaper scans for stale clients
    pub reap_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".to_string(),
            heartbeat_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(15),
        }
    }
}

/// The signaling server: one realm, one handler, one listener
pub struct SignalingServer {
    config: ServerConfig,
    realm: Arc<Realm>,
    handler: Arc<MessageHandler>,
}

impl SignalingServer {
    pub fn new(config: ServerConfig) -> Self {
        let realm = Arc::new(Realm::new());
        let handler = Arc::new(MessageHandler::new(realm.clone()));
        Self {
            config,
            realm,
            handler,
        }
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    /// Accept connections until the listener fails.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "listening");

        self.spawn_reaper();

        loop {
            let (stream, addr) = listener.accept().await?;
            let realm = self.realm.clone();
            let handler = self.handler.clone();
            tokio::spawn(async move {
                handle_connection(realm, handler, stream, addr).await;
            });
        }
    }

    /// Periodically close and remove clients that stopped heartbeating.
    fn spawn_reaper(&self) {
        let realm = self.realm.clone();
        let timeout = self.config.heartbeat_timeout;
        let mut interval = tokio::time::interval(self.config.reap_interval);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                for client in realm.stale_clients(timeout) {
                    warn!(id = %client.id(), "liveness timeout, reaping");
                    if let Some(socket) = client.socket() {
                        socket.close("heartbeat timeout").await;
                    }
                    realm.remove_client(client.id());
                }
            }
        });
    }
}

/// What the connection's writer task is asked to do
enum WriterCommand {
    Message(Message),
    Close(String),
}

/// Outbound capability backed by the connection's writer task
struct ChannelOutbound {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

#[async_trait]
impl Outbound for ChannelOutbound {
    async fn send(&self, message: Message) -> Result<(), SendError> {
        // The receiver is dropped once the writer task dies with the socket,
        // which is exactly the "channel unusable" condition.
        self.tx
            .send(WriterCommand::Message(message))
            .map_err(|_| SendError)
    }
}

/// Raw transport handle backed by the same writer task
struct ChannelSocket {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

#[async_trait]
impl Socket for ChannelSocket {
    async fn close(&self, reason: &str) {
        let _ = self.tx.send(WriterCommand::Close(reason.to_string()));
    }
}

/// Peer id from the upgrade request query string, `?id=...`
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key { Some(v) } else { None }
    })
}

async fn handle_connection(
    realm: Arc<Realm>,
    handler: Arc<MessageHandler>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    let mut requested_id: Option<PeerId> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        requested_id = get_query_param(request.uri().query(), "id")
            .filter(|id| !id.is_empty())
            .map(PeerId::from);
        Ok(response)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(error) => {
            debug!(%addr, %error, "websocket handshake failed");
            return;
        }
    };

    let id = requested_id.unwrap_or_else(|| PeerId(uuid::Uuid::new_v4().to_string()));
    let (sink, mut ws_receiver) = ws_stream.split();

    let (tx, rx) = mpsc::unbounded_channel();
    let client = Arc::new(Client::new(
        id.clone(),
        Arc::new(ChannelOutbound { tx: tx.clone() }),
        Some(Arc::new(ChannelSocket { tx: tx.clone() })),
    ));
    drop(tx);

    // The writer must hold the client weakly, otherwise it would keep its own
    // command channel open and never observe the senders going away.
    tokio::spawn(write_loop(sink, rx, Arc::downgrade(&client)));

    if let Err(error) = realm.register(client.clone()) {
        warn!(%id, %addr, %error, "registration refused");
        if let Some(socket) = client.socket() {
            socket.close("id taken").await;
        }
        return;
    }
    info!(%id, %addr, "peer registered");

    // Hand over everything that queued up while this identity was away, in
    // arrival order, before reading a single frame.
    for pending in realm.drain_queue(&id) {
        if client.send(pending).await.is_err() {
            break;
        }
    }

    let cancel = CancellationToken::new();
    loop {
        match next_request(&mut ws_receiver).await {
            Ok(message) => {
                if let Err(error) = handler.handle(&client, message, &cancel).await {
                    warn!(%id, %error, "closing connection");
                    if let Some(socket) = client.socket() {
                        socket.close("unsupported message type").await;
                    }
                    break;
                }
            }
            Err(ClientRequestError::Json(error)) => {
                warn!(%id, %error, "malformed frame, skipping");
            }
            Err(ClientRequestError::Close) => break,
            Err(ClientRequestError::WebSocket(error)) => {
                debug!(%id, %error, "websocket read failed");
                break;
            }
        }
    }

    // Abandon any in-flight relay before touching the registry.
    cancel.cancel();
    client.clear_socket();
    realm.remove_client_if(&id, &client);
    info!(%id, "peer disconnected");
}

/// Next decoded envelope from the socket; non-text frames are skipped.
async fn next_request(
    receiver: &mut (impl Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Result<Message, ClientRequestError> {
    loop {
        let frame = receiver
            .next()
            .await
            .ok_or(ClientRequestError::Close)??;
        match frame {
            WsMessage::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            WsMessage::Close(_) => return Err(ClientRequestError::Close),
            _ => continue,
        }
    }
}

/// Writer task: drains commands into the WebSocket sink until the channel or
/// the sink dies, then clears the client's transport handle so failure
/// recovery knows the socket is gone.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    client: Weak<Client>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Message(message) => {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(%error, "failed to encode envelope");
                        continue;
                    }
                };
                if sink.send(WsMessage::text(text)).await.is_err() {
                    break;
                }
            }
            WriterCommand::Close(reason) => {
                let _ = sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        }
    }
    if let Some(client) = client.upgrade() {
        client.clear_socket();
    }
}
