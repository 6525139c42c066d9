//! WebSocket signal server implementation

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use duet_core::SignalConfig;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::messages::{ClientMessage, ServerMessage};
use crate::state::SignalState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Plain HTTP requests answered on the WebSocket port
const HTTP_ROUTES: [(&[u8], &str); 2] = [
    (b"GET /health ", "/health"),
    (b"GET /stats ", "/stats"),
];

/// Re-peeks while a connection's first bytes are still a partial route line
const SNIFF_ATTEMPTS: usize = 50;
const SNIFF_INTERVAL: Duration = Duration::from_millis(10);

/// Signal server
pub struct SignalServer {
    state: Arc<SignalState>,
    config: Arc<SignalConfig>,
}

impl SignalServer {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            state: Arc::new(SignalState::new()),
            config: Arc::new(config),
        }
    }

    /// Bind the configured address and serve until the process exits
    pub async fn serve(&self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve_listener(listener, std::future::pending()).await
    }

    /// Serve connections from `listener` until `shutdown` resolves
    pub async fn serve_listener<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()>,
    {
        info!("Signal server listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        "Signal server shutting down ({} rooms, {} connections)",
                        self.room_count(),
                        self.connection_count()
                    );
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let state = self.state.clone();
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, state, config).await {
                            debug!("Connection error from {}: {:?}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }

    /// Shared relay state
    pub fn state(&self) -> Arc<SignalState> {
        self.state.clone()
    }

    /// Get room count (for monitoring)
    pub fn room_count(&self) -> usize {
        self.state.rooms().len()
    }

    /// Get connection count (for monitoring)
    pub fn connection_count(&self) -> usize {
        self.state.registry().len()
    }
}

impl Default for SignalServer {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

/// Handle a single connection (HTTP request or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<SignalState>,
    config: Arc<SignalConfig>,
) -> Result<(), BoxError> {
    if let Some(path) = sniff_http_route(&stream).await? {
        return handle_http_request(&mut stream, path, &state).await;
    }

    // Oversized frames fail the read and end the connection
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_bytes);
    ws_config.max_frame_size = Some(config.max_message_bytes);

    let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (outbox, mut inbox) = mpsc::channel::<ServerMessage>(config.outbox_capacity());
    let conn_id = state.on_connect(outbox)?;
    debug!("New connection from {} as {}", peer_addr, conn_id);

    // Writer: drains the outbox and keeps the socket alive
    let keepalive = config.keepalive();
    let mut writer = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
        loop {
            tokio::select! {
                message = inbox.recv() => {
                    let Some(message) = message else { break };
                    let json = match message.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to encode {:?}: {}", message, e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    let idle = config.idle_timeout();
    let mut writer_done = false;

    loop {
        let frame = tokio::select! {
            frame = timeout(idle, ws_receiver.next()) => frame,
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                debug!("Writer for {} stopped", conn_id);
                break;
            }
        };

        let text = match frame {
            Err(_) => {
                debug!("Connection {} idle for {:?}, dropping", conn_id, idle);
                break;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                debug!("WebSocket error from {}: {:?}", conn_id, e);
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => text,
            // Pings are answered by tungstenite; anything else only resets the idle timer
            Ok(Some(Ok(_))) => continue,
        };

        let request = match ClientMessage::from_json(&text) {
            Ok(r) => r,
            Err(e) => {
                debug!("Dropping malformed frame from {}: {}", conn_id, e);
                continue;
            }
        };

        if let Some(reply) = state.handle(&conn_id, request) {
            if !state.registry().send(&conn_id, reply) {
                break;
            }
        }
    }

    // Releases the outbox, which stops the writer
    state.on_disconnect(&conn_id);
    if !writer_done {
        let _ = writer.await;
    }

    debug!("Connection closed: {}", conn_id);
    Ok(())
}

/// Wait for enough of the request line to tell a plain HTTP request from an upgrade
///
/// Clients may split the request line across segments, so a prefix of a
/// route line is re-peeked until it completes or diverges.
async fn sniff_http_route(stream: &TcpStream) -> io::Result<Option<&'static str>> {
    let mut buf = [0u8; 16];

    for _ in 0..SNIFF_ATTEMPTS {
        let n = stream.peek(&mut buf).await?;
        let head = &buf[..n];

        if let Some(path) = http_route(head) {
            return Ok(Some(path));
        }
        if n == 0 || !could_be_http_route(head) {
            return Ok(None);
        }
        sleep(SNIFF_INTERVAL).await;
    }

    Ok(None)
}

fn could_be_http_route(head: &[u8]) -> bool {
    HTTP_ROUTES.iter().any(|(prefix, _)| prefix.starts_with(head))
}

fn http_route(head: &[u8]) -> Option<&'static str> {
    HTTP_ROUTES
        .iter()
        .find(|(prefix, _)| head.starts_with(prefix))
        .map(|(_, path)| *path)
}

/// Answer a health or stats request
async fn handle_http_request(
    stream: &mut TcpStream,
    path: &str,
    state: &SignalState,
) -> Result<(), BoxError> {
    // Drain the request; only the path matters
    let mut buf = vec![0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let stats = state.stats();
    let body = match path {
        "/health" => serde_json::json!({
            "status": "healthy",
            "rooms": stats.rooms,
            "connections": stats.connections,
        }),
        _ => serde_json::to_value(stats)?,
    }
    .to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    Ok(())
}
