//! WebSocket client for the PTY endpoint

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use tether_protocol::{encode_outbound, pty_url, Frame, Outbound, Session};
use tether_utils::{Result, TetherError};

use super::limiter::{ReconnectLimiter, DEFAULT_RECONNECT_INTERVAL};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a graceful close may take before the socket task is aborted
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

const CHANNEL_CAPACITY: usize = 256;

/// Something that happened on the socket
#[derive(Debug)]
pub enum ConnectionEvent {
    /// An inbound frame, in arrival order
    Frame(Frame),
    /// The host closed the socket
    Closed { reason: Option<String> },
    /// The socket broke
    Failed(TetherError),
}

/// Result of a connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Opened,
    /// Too soon after the previous attempt; nothing was opened
    Throttled,
}

/// One WebSocket at a time to a PTY host
pub struct Connection {
    /// Host as configured (`host:port`, `ws://`, `https://`, ...)
    host: String,
    limiter: ReconnectLimiter,
    /// Outgoing frames; `None` when no socket exists
    tx: Option<mpsc::Sender<Message>>,
    /// Socket events for the current socket
    rx: mpsc::Receiver<ConnectionEvent>,
    open: Arc<AtomicBool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    conn_id: Option<Uuid>,
}

impl Connection {
    /// Create a connection manager for `host` (not yet connected)
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_reconnect_interval(host, DEFAULT_RECONNECT_INTERVAL)
    }

    pub fn with_reconnect_interval(host: impl Into<String>, interval: Duration) -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            host: host.into(),
            limiter: ReconnectLimiter::new(interval),
            tx: None,
            rx,
            open: Arc::new(AtomicBool::new(false)),
            task_handle: None,
            conn_id: None,
        }
    }

    /// Whether the current socket is open for sending
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Claim a connect attempt from the reconnect limiter
    ///
    /// Returns `false` when called again within the reconnect interval.
    /// A granted attempt counts even if [`Connection::open`] then fails.
    pub fn try_begin(&mut self) -> bool {
        self.limiter.try_acquire(Instant::now())
    }

    /// Open a socket for `session`, closing any previous one first
    ///
    /// Does not consult the reconnect limiter; pair it with
    /// [`Connection::try_begin`].
    pub async fn open(&mut self, session: &Session, reset: bool) -> Result<()> {
        self.close().await;

        let url = pty_url(&self.host, session, reset).map_err(|e| TetherError::InvalidUrl {
            url: self.host.clone(),
            reason: e.to_string(),
        })?;

        let conn_id = Uuid::new_v4();
        tracing::info!(%conn_id, %url, "Connecting to PTY host");

        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            TetherError::connection(format!("Failed to connect to {}: {}", url, e))
        })?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<ConnectionEvent>(CHANNEL_CAPACITY);

        self.open.store(true, Ordering::Release);
        self.tx = Some(outgoing_tx);
        self.rx = events_rx;
        self.conn_id = Some(conn_id);

        let open = Arc::clone(&self.open);
        let handle = tokio::spawn(Self::connection_task(
            conn_id,
            ws_stream,
            outgoing_rx,
            events_tx,
            open,
        ));
        self.task_handle = Some(handle);

        Ok(())
    }

    /// Rate-limited [`Connection::open`]
    ///
    /// Returns [`ConnectOutcome::Throttled`] without touching the current
    /// socket when called again within the reconnect interval.
    pub async fn connect(&mut self, session: &Session, reset: bool) -> Result<ConnectOutcome> {
        if !self.try_begin() {
            tracing::debug!(session = %session.label(), "Connect throttled");
            return Ok(ConnectOutcome::Throttled);
        }
        self.open(session, reset).await?;
        Ok(ConnectOutcome::Opened)
    }

    /// Send a message if the socket is open
    ///
    /// Returns whether the message was handed to the socket. Nothing is
    /// queued for later.
    pub async fn send(&self, msg: &Outbound) -> bool {
        let tx = match (&self.tx, self.is_open()) {
            (Some(tx), true) => tx,
            _ => {
                tracing::trace!("Dropping outbound message, socket not open");
                return false;
            }
        };

        let message = match encode_outbound(msg) {
            Ok(Frame::Text(text)) => Message::Text(text),
            Ok(Frame::Binary(data)) => Message::Binary(data.to_vec()),
            Err(e) => {
                tracing::warn!("Failed to encode outbound message: {}", e);
                return false;
            }
        };

        tx.send(message).await.is_ok()
    }

    /// Next event on the current socket
    ///
    /// Returns `None` once the socket task has finished and every event
    /// has been delivered, or when no socket was ever opened.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Close the current socket, if any
    ///
    /// Sends a close frame and gives the socket task a moment to finish
    /// before aborting it. Events not yet read are discarded.
    pub async fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        // Dropping the sender tells the task to close the socket
        self.tx = None;

        if let Some(mut handle) = self.task_handle.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!(conn_id = ?self.conn_id, "Socket task did not stop, aborting");
                handle.abort();
            }
        }

        let (_, rx) = mpsc::channel(1);
        self.rx = rx;
        if let Some(conn_id) = self.conn_id.take() {
            tracing::debug!(%conn_id, "Connection closed");
        }
        // A fresh socket gets its own flag so a finishing task cannot clear it
        self.open = Arc::new(AtomicBool::new(false));
    }

    /// Background task that owns the socket
    async fn connection_task(
        conn_id: Uuid,
        ws_stream: WsStream,
        mut outgoing: mpsc::Receiver<Message>,
        events: mpsc::Sender<ConnectionEvent>,
        open: Arc<AtomicBool>,
    ) {
        let (mut sink, mut stream) = ws_stream.split();

        loop {
            tokio::select! {
                msg = outgoing.recv() => {
                    match msg {
                        Some(msg) => {
                            if let Err(e) = sink.send(msg).await {
                                tracing::error!(%conn_id, "Failed to send frame: {}", e);
                                open.store(false, Ordering::Release);
                                let _ = events.send(ConnectionEvent::Failed(transport_error(e))).await;
                                break;
                            }
                        }
                        None => {
                            // Local close
                            if let Err(e) = sink.close().await {
                                tracing::debug!(%conn_id, "Error closing socket: {}", e);
                            }
                            break;
                        }
                    }
                }

                result = stream.next() => {
                    match result {
                        Some(Ok(Message::Text(text))) => {
                            tracing::debug!(%conn_id, len = text.len(), "Received text frame");
                            if events.send(ConnectionEvent::Frame(Frame::Text(text))).await.is_err() {
                                tracing::debug!(%conn_id, "Event channel closed, receiver dropped");
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            tracing::debug!(%conn_id, len = data.len(), "Received binary frame");
                            if events.send(ConnectionEvent::Frame(Frame::Binary(Bytes::from(data)))).await.is_err() {
                                tracing::debug!(%conn_id, "Event channel closed, receiver dropped");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty());
                            tracing::info!(%conn_id, ?reason, "Host closed connection");
                            open.store(false, Ordering::Release);
                            let _ = events.send(ConnectionEvent::Closed { reason }).await;
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong are answered by tungstenite
                        }
                        Some(Err(e)) => {
                            tracing::error!(%conn_id, "Failed to receive frame: {}", e);
                            open.store(false, Ordering::Release);
                            let _ = events.send(ConnectionEvent::Failed(transport_error(e))).await;
                            break;
                        }
                        None => {
                            tracing::info!(%conn_id, "Connection stream ended");
                            open.store(false, Ordering::Release);
                            let _ = events.send(ConnectionEvent::Closed { reason: None }).await;
                            break;
                        }
                    }
                }
            }
        }

        open.store(false, Ordering::Release);
    }
}

/// Map a socket failure, telling a dropped peer apart from other errors
fn transport_error(err: tungstenite::Error) -> TetherError {
    match err {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TetherError::ConnectionClosed
        }
        other => TetherError::WebSocket(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};

    use tether_protocol::ClientControl;

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn accept(listener: &TcpListener) -> ServerSocket {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    fn session() -> Session {
        Session::new("repo/branch", "claude")
    }

    #[tokio::test]
    async fn test_send_not_connected() {
        let conn = Connection::new("localhost:1");
        assert!(!conn.is_open());
        assert!(!conn.send(&Outbound::Control(ClientControl::Ready)).await);
    }

    #[tokio::test]
    async fn test_next_event_without_socket() {
        let mut conn = Connection::new("localhost:1");
        assert!(conn.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_and_exchange_frames() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;

            // Control as text, keystrokes as binary
            let ready = ws.next().await.unwrap().unwrap();
            assert_eq!(ready, Message::Text(r#"{"type":"ready"}"#.to_string()));
            let input = ws.next().await.unwrap().unwrap();
            assert_eq!(input, Message::Binary(b"ls\n".to_vec()));

            ws.send(Message::Text(r#"{"type":"buffer-complete"}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Binary(b"$ ".to_vec())).await.unwrap();
            ws
        });

        let mut conn = Connection::new(addr.to_string());
        let outcome = conn.connect(&session(), false).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Opened);
        assert!(conn.is_open());

        assert!(conn.send(&Outbound::Control(ClientControl::Ready)).await);
        assert!(conn.send(&Outbound::Input(Bytes::from_static(b"ls\n"))).await);

        match conn.next_event().await {
            Some(ConnectionEvent::Frame(Frame::Text(text))) => {
                assert_eq!(text, r#"{"type":"buffer-complete"}"#)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match conn.next_event().await {
            Some(ConnectionEvent::Frame(Frame::Binary(data))) => assert_eq!(&data[..], b"$ "),
            other => panic!("unexpected event: {:?}", other),
        }

        let _ws = server.await.unwrap();
        conn.close().await;
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_host_close_reports_reason() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "session ended".into(),
            }))
            .await
            .unwrap();
            // Drain until the client acknowledges the close
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut conn = Connection::new(addr.to_string());
        conn.connect(&session(), false).await.unwrap();

        match conn.next_event().await {
            Some(ConnectionEvent::Closed { reason }) => {
                assert_eq!(reason.as_deref(), Some("session ended"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!conn.is_open());
        assert!(!conn.send(&Outbound::Control(ClientControl::Ready)).await);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_is_throttled() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let _ws = accept(&listener).await;
            // A second physical connect would be accepted here
            tokio::time::timeout(Duration::from_millis(200), listener.accept())
                .await
                .is_ok()
        });

        let mut conn = Connection::new(addr.to_string());
        assert_eq!(
            conn.connect(&session(), false).await.unwrap(),
            ConnectOutcome::Opened
        );
        for _ in 0..5 {
            assert_eq!(
                conn.connect(&session(), false).await.unwrap(),
                ConnectOutcome::Throttled
            );
        }
        // Throttling leaves the open socket alone
        assert!(conn.is_open());

        let second_connect = server.await.unwrap();
        assert!(!second_connect);
        conn.close().await;
    }

    #[tokio::test]
    async fn test_peer_drop_without_close_is_connection_closed() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let ws = accept(&listener).await;
            drop(ws);
        });

        let mut conn = Connection::new(addr.to_string());
        conn.connect(&session(), false).await.unwrap();
        server.await.unwrap();

        match tokio::time::timeout(Duration::from_secs(5), conn.next_event()).await.unwrap() {
            Some(ConnectionEvent::Failed(err)) => {
                assert!(matches!(err, TetherError::ConnectionClosed));
                assert!(err.is_retryable());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!conn.is_open());
    }

    #[test]
    fn test_try_begin_claims_one_attempt_per_interval() {
        let mut conn = Connection::new("localhost:1");
        assert!(conn.try_begin());
        assert!(!conn.try_begin());

        let mut unlimited = Connection::with_reconnect_interval("localhost:1", Duration::ZERO);
        assert!(unlimited.try_begin());
        assert!(unlimited.try_begin());
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_socket() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut first = accept(&listener).await;
            let _second = accept(&listener).await;
            // The first socket sees the client close it
            loop {
                match first.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        });

        let mut conn = Connection::with_reconnect_interval(addr.to_string(), Duration::ZERO);
        conn.connect(&session(), false).await.unwrap();
        conn.connect(&session(), true).await.unwrap();
        assert!(conn.is_open());

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        conn.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, addr) = listener().await;
        drop(listener);

        let mut conn = Connection::new(addr.to_string());
        let err = conn.connect(&session(), false).await.unwrap_err();
        assert!(matches!(err, TetherError::Connection(_)));
        assert!(err.is_retryable());
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_invalid_host() {
        let mut conn = Connection::new("ftp://example.com");
        let err = conn.connect(&session(), false).await.unwrap_err();
        assert!(matches!(err, TetherError::InvalidUrl { .. }));
    }
}
