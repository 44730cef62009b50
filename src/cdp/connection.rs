//! CDP WebSocket connection implementation
//!
//! This module provides the WebSocket-based control channel to one target.
//! The socket is split: the write half sits behind a mutex shared by all
//! senders, the read half is owned by a spawned reader task that resolves
//! responses through the [`CommandCorrelator`] and fans events out to
//! subscribers in arrival order.

use super::correlator::CommandCorrelator;
use super::traits::{CdpConnection, CdpError as CdpErrorResponse, CdpEvent, CdpResponse};
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>>;

/// How often the reader task sweeps the correlator for expired entries
const REAP_INTERVAL: Duration = Duration::from_millis(250);

/// CDP timeout configuration
#[derive(Debug, Clone)]
pub struct CdpTimeoutConfig {
    /// Default timeout for most commands
    pub default_timeout: Duration,
    /// Timeout for screenshot commands
    pub screenshot_timeout: Duration,
    /// Timeout for page navigation commands
    pub navigation_timeout: Duration,
    /// Timeout for JavaScript execution
    pub execution_timeout: Duration,
}

impl Default for CdpTimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            screenshot_timeout: Duration::from_secs(90),
            navigation_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(30),
        }
    }
}

impl CdpTimeoutConfig {
    /// Get timeout duration for a specific command method
    pub fn for_method(&self, method: &str) -> Duration {
        let method_lower = method.to_lowercase();

        if method_lower.contains("screenshot") || method_lower.contains("capture") {
            return self.screenshot_timeout;
        }

        if method_lower.contains("navigate") || method_lower.contains("reload") {
            return self.navigation_timeout;
        }

        if method_lower.starts_with("runtime.evaluate") || method_lower.starts_with("runtime.call") {
            return self.execution_timeout;
        }

        self.default_timeout
    }
}

/// CDP WebSocket connection implementation
pub struct CdpWebSocketConnection {
    /// WebSocket URL
    url: String,
    /// Write half of the socket
    sink: Arc<Mutex<WsSink>>,
    /// Pending commands
    correlator: Arc<CommandCorrelator>,
    /// Event subscribers
    event_subscribers: Subscribers,
    /// Is connection active
    is_active: Arc<AtomicBool>,
    /// Timeout configuration
    timeout_config: CdpTimeoutConfig,
    /// Reader task, aborted when the connection is dropped
    reader: JoinHandle<()>,
}

impl fmt::Debug for CdpWebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpWebSocketConnection")
            .field("url", &self.url)
            .field("is_active", &self.is_active())
            .field("timeout_config", &self.timeout_config)
            .finish_non_exhaustive()
    }
}

impl CdpWebSocketConnection {
    /// Create a new CDP WebSocket connection
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://127.0.0.1:9222/devtools/page/ABC123")
    /// * `timeout_config` - per-method command deadlines
    pub async fn new<S: Into<String>>(url: S, timeout_config: CdpTimeoutConfig) -> Result<Arc<Self>, Error> {
        let url = url.into();
        info!("Connecting to WebSocket: {}", url);

        let handshake = timeout_config.default_timeout;
        let (ws_stream, _) = tokio::time::timeout(handshake, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                Error::connection(format!("WebSocket handshake with {} timed out after {:?}", url, handshake))
            })?
            .map_err(|e| Error::connection(format!("Failed to connect to {}: {}", url, e)))?;

        let (sink, stream) = ws_stream.split();
        let sink = Arc::new(Mutex::new(sink));
        let correlator = Arc::new(CommandCorrelator::new());
        let event_subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let is_active = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(Self::message_loop(
            stream,
            Arc::clone(&sink),
            Arc::clone(&correlator),
            Arc::clone(&event_subscribers),
            Arc::clone(&is_active),
        ));

        info!("WebSocket connection established");

        Ok(Arc::new(Self {
            url,
            sink,
            correlator,
            event_subscribers,
            is_active,
            timeout_config,
            reader,
        }))
    }

    /// WebSocket URL this connection was opened against
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of commands awaiting a response
    pub async fn pending_commands(&self) -> usize {
        self.correlator.pending_count().await
    }

    /// Reader loop: demultiplexes frames and periodically reclaims expired
    /// commands. On exit every pending command is rejected.
    async fn message_loop(
        mut stream: SplitStream<WsStream>,
        sink: Arc<Mutex<WsSink>>,
        correlator: Arc<CommandCorrelator>,
        event_subscribers: Subscribers,
        is_active: Arc<AtomicBool>,
    ) {
        let mut sweep = tokio::time::interval(REAP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        Self::handle_message(&text, &correlator, &event_subscribers).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.lock().await.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket close frame received");
                        break "close frame received".to_string();
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break format!("read error: {}", e);
                    }
                    None => {
                        warn!("WebSocket stream closed");
                        break "stream ended".to_string();
                    }
                },
                _ = sweep.tick() => {
                    correlator.reap_expired(Instant::now()).await;
                }
            }
        };

        is_active.store(false, Ordering::SeqCst);
        let failed = correlator.fail_all(&reason).await;
        event_subscribers.lock().await.clear();
        info!("Message loop exited ({}), {} pending commands rejected", reason, failed);
    }

    /// Handle incoming WebSocket text frame
    async fn handle_message(text: &str, correlator: &CommandCorrelator, event_subscribers: &Subscribers) {
        match CdpMessage::parse(text) {
            Some(CdpMessage::Response(response)) => {
                correlator
                    .resolve(CdpResponse {
                        id: response.id,
                        result: Some(response.result),
                        error: response.error.map(|e| CdpErrorResponse {
                            code: e.code,
                            message: e.message,
                            data: e.data,
                        }),
                    })
                    .await;
            }
            Some(CdpMessage::Notification(notification)) => {
                debug!("Received event: {}", notification.method);

                let event = CdpEvent {
                    method: notification.method,
                    params: notification.params,
                    session_id: notification.session_id,
                };

                // Broadcast, dropping subscribers whose receiver is gone
                event_subscribers
                    .lock()
                    .await
                    .retain(|sender| sender.send(event.clone()).is_ok());
            }
            None => warn!("Unknown message format: {}", text),
        }
    }
}

#[async_trait]
impl CdpConnection for CdpWebSocketConnection {
    async fn send_command(&self, method: &str, params: serde_json::Value) -> Result<CdpResponse, Error> {
        if !self.is_active() {
            return Err(Error::connection(format!("Connection to {} is not active", self.url)));
        }

        let timeout = self.timeout_config.for_method(method);
        let (id, receiver) = self.correlator.register(method, timeout).await;

        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
        };
        let json = serde_json::to_string(&request)?;

        debug!("Sending CDP command {}: {} (timeout {:?})", id, method, timeout);

        let sent = self.sink.lock().await.send(Message::Text(json)).await;
        if let Err(e) = sent {
            self.correlator.expire(id).await;
            return Err(Error::connection(format!("Failed to send {}: {}", method, e)));
        }

        self.correlator.await_response(id, method, receiver, timeout).await
    }

    async fn listen_events(&self) -> Result<mpsc::UnboundedReceiver<CdpEvent>, Error> {
        if !self.is_active() {
            return Err(Error::connection("Connection is not active"));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.event_subscribers.lock().await.push(sender);
        Ok(receiver)
    }

    async fn close(&self) -> Result<(), Error> {
        info!("Closing CDP WebSocket connection to {}", self.url);

        let was_active = self.is_active.swap(false, Ordering::SeqCst);
        if was_active {
            if let Err(e) = self.sink.lock().await.close().await {
                debug!("WebSocket close handshake failed: {}", e);
            }
        }

        self.correlator.fail_all("connection closed").await;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

impl Drop for CdpWebSocketConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
