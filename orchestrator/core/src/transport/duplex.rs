//! Persistent Duplex Socket Channel
//!
//! Bidirectional frame channel over a websocket connection. This is the
//! delivery mechanism for realtime voice protocols: JSON protocol messages as
//! text frames, raw audio as binary frames.
//!
//! A background read task drains the socket into an internal queue so that
//! `recv` never competes with ping/pong handling. Closing the channel tears
//! the task down and drops the socket; `close` is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::traits::{TransportChannel, TransportError, TransportFrame, TransportKind};

/// Timeout for the initial websocket handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound queue depth before the read task applies backpressure
const INBOUND_QUEUE: usize = 256;

type WsSink = futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Persistent duplex socket to a provider endpoint
pub struct DuplexSocket {
    url: String,
    bearer: Option<String>,
    extra_headers: Vec<(String, String)>,
    write: tokio::sync::Mutex<Option<WsSink>>,
    inbound: Option<mpsc::Receiver<TransportFrame>>,
    read_task: Option<tokio::task::JoinHandle<()>>,
    open: Arc<AtomicBool>,
    last_activity: Arc<parking_lot::Mutex<Instant>>,
}

impl DuplexSocket {
    /// Create an unopened socket targeting `url`
    #[must_use]
    pub fn new(url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            url: url.into(),
            bearer,
            extra_headers: Vec::new(),
            write: tokio::sync::Mutex::new(None),
            inbound: None,
            read_task: None,
            open: Arc::new(AtomicBool::new(false)),
            last_activity: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Attach an extra request header for the handshake (vendor beta flags etc.)
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// How long since the peer last produced any frame (including pongs)
    ///
    /// Liveness input for the connection manager's staleness check.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Take ownership of the inbound frame queue
    ///
    /// Adapters take the queue so a background translation task can consume
    /// frames while sends keep going through `&self`. After taking, `recv`
    /// on the socket itself returns `InvalidState`. Returns `None` if the
    /// socket is unopened or the queue was already taken.
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<TransportFrame>> {
        self.inbound.take()
    }
}

#[async_trait]
impl TransportChannel for DuplexSocket {
    fn kind(&self) -> TransportKind {
        TransportKind::Duplex
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidState("already open".into()));
        }

        let mut request = self
            .url
            .clone()
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        if let Some(token) = &self.bearer {
            request.headers_mut().insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::Handshake(e.to_string()))?,
            );
        }
        for (name, value) in &self.extra_headers {
            let name: tokio_tungstenite::tungstenite::http::HeaderName = name
                .parse()
                .map_err(|_| TransportError::Handshake(format!("bad header name: {name}")))?;
            request.headers_mut().insert(
                name,
                HeaderValue::from_str(value)
                    .map_err(|e| TransportError::Handshake(e.to_string()))?,
            );
        }

        let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout("websocket handshake".into()))?
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (sink, mut source) = stream.split();
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let open = Arc::clone(&self.open);
        let activity = Arc::clone(&self.last_activity);

        let read_task = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                *activity.lock() = Instant::now();
                let frame = match message {
                    Ok(Message::Text(text)) => TransportFrame::Text(text),
                    Ok(Message::Binary(data)) => TransportFrame::Binary(data),
                    Ok(Message::Close(_)) => {
                        debug!("peer closed duplex socket");
                        break;
                    }
                    // Pings are answered by tungstenite; both count as activity
                    Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                    Ok(Message::Frame(_)) => continue,
                    Err(e) => {
                        warn!(error = %e, "duplex socket read failed");
                        break;
                    }
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            open.store(false, Ordering::SeqCst);
        });

        *self.write.lock().await = Some(sink);
        self.inbound = Some(rx);
        self.read_task = Some(read_task);
        self.open.store(true, Ordering::SeqCst);
        *self.last_activity.lock() = Instant::now();

        debug!(url = %self.url, "duplex socket open");
        Ok(())
    }

    async fn send(&self, frame: TransportFrame) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let message = match frame {
            TransportFrame::Text(text) => Message::Text(text),
            TransportFrame::Binary(data) => Message::Binary(data),
        };

        let mut guard = self.write.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::Closed)?;
        sink.send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<TransportFrame, TransportError> {
        let rx = self
            .inbound
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("channel not open".into()))?;
        rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);

        if let Some(mut sink) = self.write.lock().await.take() {
            // Best-effort close frame; the peer may already be gone.
            let _ = sink.send(Message::Close(None)).await;
        }
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.inbound = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for DuplexSocket {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}
