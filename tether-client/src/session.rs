//! Async driver for one session engine
//!
//! The runner owns the engine and its connection and is the only task
//! that touches either. Socket events, local events and timer deadlines
//! are fed to the engine in arrival order.

use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tether_protocol::{Dimensions, Session};

use crate::connection::{Connection, ConnectionEvent};
use crate::engine::{Engine, InputOutcome, ServerFault, SessionObserver};
use crate::renderer::{ContainerSize, Renderer};

/// Event from the local side of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// Keystrokes or pasted text
    Input(Bytes),
    /// The renderer's grid changed size
    Resize(Dimensions),
    /// The renderer's container changed size
    Container(ContainerSize),
    Focus(bool),
    /// Ask for write access
    Promote,
    /// Ask the host to recreate the PTY
    Reset,
    /// Leave the session
    Detach,
}

/// Why [`SessionRunner::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user detached; the engine is disposed
    Detached,
    /// The socket went away or never opened
    Disconnected { reason: Option<String> },
    /// The host reported an error; the socket is closed
    ServerError(ServerFault),
    /// Connect was refused by the reconnect rate limit
    Throttled,
    /// The cancellation token fired; the engine is disposed
    Cancelled,
}

impl SessionEnd {
    /// Whether running again can make progress
    pub fn can_retry(&self) -> bool {
        !matches!(self, SessionEnd::Detached | SessionEnd::Cancelled)
    }
}

pub struct SessionRunner<R: Renderer, O: SessionObserver> {
    engine: Engine<R, O>,
    connection: Connection,
    cancel: CancellationToken,
}

impl<R: Renderer, O: SessionObserver> SessionRunner<R, O> {
    pub fn new(engine: Engine<R, O>, connection: Connection) -> Self {
        Self {
            engine,
            connection,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops [`SessionRunner::run`] from another task
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &Engine<R, O> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<R, O> {
        &mut self.engine
    }

    /// Connect and drive the session until it ends
    ///
    /// Can be called again after a disconnect or server error to retry
    /// with the same engine. `reset` asks the host for a fresh PTY.
    pub async fn run(&mut self, local: &mut mpsc::Receiver<LocalEvent>, reset: bool) -> SessionEnd {
        if self.engine.is_disposed() || self.cancel.is_cancelled() {
            return SessionEnd::Cancelled;
        }

        let session = self.engine.session().clone();
        if !self.connection.try_begin() {
            tracing::debug!(session = %session.label(), "Connect throttled");
            return SessionEnd::Throttled;
        }

        self.engine.on_connecting();
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::info!(session = %session.label(), "Session cancelled while connecting");
                self.shutdown().await;
                return SessionEnd::Cancelled;
            }
            result = self.connection.open(&session, reset) => result,
        };
        if let Err(e) = opened {
            self.engine.on_transport_error(&e);
            return SessionEnd::Disconnected {
                reason: Some(e.to_string()),
            };
        }
        self.engine.on_open(Instant::now());
        self.flush().await;

        loop {
            let deadline = self.engine.next_deadline();

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(session = %session.label(), "Session cancelled");
                    self.shutdown().await;
                    return SessionEnd::Cancelled;
                }

                event = self.connection.next_event() => {
                    match event {
                        Some(ConnectionEvent::Frame(frame)) => {
                            self.engine.on_frame(frame, Instant::now());
                        }
                        Some(ConnectionEvent::Closed { reason }) => {
                            self.engine.on_closed(reason.as_deref());
                            return self.ended(reason);
                        }
                        Some(ConnectionEvent::Failed(e)) => {
                            self.engine.on_transport_error(&e);
                            return self.ended(Some(e.to_string()));
                        }
                        None => {
                            self.engine.on_closed(None);
                            return self.ended(None);
                        }
                    }
                }

                event = local.recv() => {
                    match event {
                        Some(LocalEvent::Detach) | None => {
                            tracing::info!(session = %session.label(), "Detaching");
                            self.shutdown().await;
                            return SessionEnd::Detached;
                        }
                        Some(event) => self.on_local(event),
                    }
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now).into()), if deadline.is_some() => {
                    self.engine.poll_timers(Instant::now());
                }
            }

            if let Some(fault) = self.engine.server_fault().cloned() {
                self.connection.close().await;
                self.engine.on_closed(Some("server error"));
                return SessionEnd::ServerError(fault);
            }

            self.flush().await;
        }
    }

    /// Tear down this session and start over on `session`
    ///
    /// Nothing carries over except the renderer, the observer and the
    /// connection's rate limit.
    pub async fn switch_session(mut self, session: Session) -> Self {
        tracing::info!(from = %self.engine.session().label(), to = %session.label(), "Switching session");
        self.connection.close().await;
        self.engine.dispose();

        let options = self.engine.options().clone();
        let (renderer, observer) = self.engine.into_parts();
        Self {
            engine: Engine::new(session, options, renderer, observer),
            connection: self.connection,
            cancel: self.cancel,
        }
    }

    /// Close the socket and dispose the engine
    pub async fn shutdown(&mut self) {
        self.connection.close().await;
        self.engine.dispose();
    }

    fn on_local(&mut self, event: LocalEvent) {
        let now = Instant::now();
        match event {
            LocalEvent::Input(data) => {
                if self.engine.on_local_input(data) == InputOutcome::Dropped {
                    tracing::trace!("Input dropped, session not open");
                }
            }
            LocalEvent::Resize(dims) => {
                tracing::trace!(%dims, "Local grid resized");
                self.engine.on_local_resize(now);
            }
            LocalEvent::Container(size) => self.engine.on_container_resize(size, now),
            LocalEvent::Focus(focused) => self.engine.on_focus(focused),
            LocalEvent::Promote => {
                if !self.engine.request_promotion() {
                    tracing::debug!("Promotion not requested, session writable or closed");
                }
            }
            LocalEvent::Reset => {
                self.engine.request_reset();
            }
            LocalEvent::Detach => {}
        }
    }

    async fn flush(&mut self) {
        for msg in self.engine.take_outbound() {
            self.connection.send(&msg).await;
        }
    }

    fn ended(&self, reason: Option<String>) -> SessionEnd {
        match self.engine.server_fault() {
            Some(fault) => SessionEnd::ServerError(fault.clone()),
            None => SessionEnd::Disconnected { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    use crate::engine::{ConnectionState, EngineOptions};
    use crate::renderer::recording::RecordingRenderer;

    #[derive(Debug, Default)]
    struct Connected(Vec<bool>);

    impl SessionObserver for Connected {
        fn on_connected(&mut self, connected: bool) {
            self.0.push(connected);
        }
    }

    type TestRunner = SessionRunner<RecordingRenderer, Connected>;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return text,
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    fn runner(host: &str, options: EngineOptions) -> TestRunner {
        let engine = Engine::new(
            Session::new("repo/branch", "claude"),
            options,
            RecordingRenderer::new(Dimensions::new(80, 24)),
            Connected::default(),
        );
        SessionRunner::new(engine, Connection::new(host))
    }

    #[tokio::test]
    async fn test_replay_then_input_then_disconnect() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            ws.send(Message::Text(r#"{"type":"read-only","data":false}"#.into()))
                .await
                .unwrap();
            assert_eq!(next_text(&mut ws).await, r#"{"type":"ready"}"#);

            ws.send(Message::Text(r#"{"type":"buffer-size","cols":80,"rows":24}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(b"hello".to_vec())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"buffer-complete"}"#.into()))
                .await
                .unwrap();

            let input = ws.next().await.unwrap().unwrap();
            assert_eq!(input, Message::Binary(b"x".to_vec()));
            ws.close(None).await.unwrap();
        });

        let mut runner = runner(&addr, EngineOptions::default());
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(LocalEvent::Input(Bytes::from_static(b"x"))).await.unwrap();

        let end = tokio::time::timeout(Duration::from_secs(5), runner.run(&mut rx, false))
            .await
            .unwrap();
        server.await.unwrap();

        assert!(matches!(end, SessionEnd::Disconnected { .. }));
        assert!(end.can_retry());
        assert_eq!(runner.engine().renderer().written(), b"hello".to_vec());
        assert_eq!(runner.engine().observer().0, vec![true, false]);
        assert_eq!(runner.engine().state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_server_error_ends_run() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            next_text(&mut ws).await;
            ws.send(Message::Text(
                r#"{"type":"error","error":"Worktree not found","message":"gone","code":"WORKTREE_NOT_FOUND"}"#.into(),
            ))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut runner = runner(&addr, EngineOptions::default());
        let (_tx, mut rx) = mpsc::channel(8);
        let end = tokio::time::timeout(Duration::from_secs(5), runner.run(&mut rx, false))
            .await
            .unwrap();
        server.await.unwrap();

        match end {
            SessionEnd::ServerError(fault) => {
                assert_eq!(fault.code.as_deref(), Some("WORKTREE_NOT_FOUND"));
                assert_eq!(fault.summary(), "gone");
            }
            other => panic!("unexpected end: {:?}", other),
        }
        assert_eq!(runner.engine().state(), ConnectionState::Errored);
        assert_eq!(runner.engine().observer().0, vec![true, false]);
    }

    #[tokio::test]
    async fn test_delayed_prompt_after_ready() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let ready = next_text(&mut ws).await;
            let prompt = next_text(&mut ws).await;
            (ready, prompt)
        });

        let mut runner = runner(
            &addr,
            EngineOptions {
                initial_prompt: Some("fix the tests".into()),
                prompt_delay: Duration::from_millis(50),
                ..EngineOptions::default()
            },
        );
        let (_tx, mut rx) = mpsc::channel(8);
        let end = tokio::time::timeout(Duration::from_secs(5), runner.run(&mut rx, false))
            .await
            .unwrap();
        assert!(matches!(end, SessionEnd::Disconnected { .. }));

        let (ready, prompt) = server.await.unwrap();
        assert_eq!(ready, r#"{"type":"ready"}"#);
        assert_eq!(
            prompt,
            r#"{"type":"prompt","data":"fix the tests","submit":true}"#
        );
    }

    #[tokio::test]
    async fn test_detach_disposes_engine() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut runner = runner(&addr, EngineOptions::default());
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(LocalEvent::Detach).await.unwrap();

        let end = runner.run(&mut rx, false).await;
        assert_eq!(end, SessionEnd::Detached);
        assert!(!end.can_retry());
        assert!(runner.engine().is_disposed());

        // A disposed engine does not reconnect
        assert_eq!(runner.run(&mut rx, false).await, SessionEnd::Cancelled);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut runner = runner(&addr, EngineOptions::default());
        let cancel = runner.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let (_tx, mut rx) = mpsc::channel(8);
        let end = tokio::time::timeout(Duration::from_secs(5), runner.run(&mut rx, false))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        assert!(runner.engine().is_disposed());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_disconnect() {
        let (listener, addr) = listener().await;
        drop(listener);

        let mut runner = runner(&addr, EngineOptions::default());
        let (_tx, mut rx) = mpsc::channel(8);
        let end = runner.run(&mut rx, false).await;

        assert!(matches!(end, SessionEnd::Disconnected { reason: Some(_) }));
        assert_eq!(runner.engine().state(), ConnectionState::Errored);
        assert_eq!(runner.engine().observer().0, vec![false]);

        // Retrying at once is throttled
        assert_eq!(runner.run(&mut rx, false).await, SessionEnd::Throttled);
    }

    #[derive(Debug, Clone, Default)]
    struct SharedStates(Arc<Mutex<Vec<ConnectionState>>>);

    impl SessionObserver for SharedStates {
        fn on_state_changed(&mut self, state: ConnectionState) {
            self.0.lock().unwrap().push(state);
        }
    }

    #[tokio::test]
    async fn test_connecting_while_handshake_pending() {
        let (listener, addr) = listener().await;
        // Accept TCP but never answer the upgrade
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let states = SharedStates::default();
        let engine = Engine::new(
            Session::new("repo/branch", "claude"),
            EngineOptions::default(),
            RecordingRenderer::new(Dimensions::new(80, 24)),
            states.clone(),
        );
        let mut runner = SessionRunner::new(engine, Connection::new(addr));
        let (_tx, mut rx) = mpsc::channel(8);

        let pending =
            tokio::time::timeout(Duration::from_millis(300), runner.run(&mut rx, false)).await;
        assert!(pending.is_err());

        assert_eq!(*states.0.lock().unwrap(), vec![ConnectionState::Connecting]);
        assert_eq!(runner.engine().state(), ConnectionState::Connecting);
        server.abort();
    }

    #[tokio::test]
    async fn test_cancel_while_handshake_pending() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let mut runner = runner(&addr, EngineOptions::default());
        let cancel = runner.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let (_tx, mut rx) = mpsc::channel(8);
        let end = tokio::time::timeout(Duration::from_secs(1), runner.run(&mut rx, false))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        assert!(runner.engine().is_disposed());
        assert!(runner.engine().observer().0.is_empty());
        server.abort();
    }

    #[tokio::test]
    async fn test_switch_session_builds_fresh_engine() {
        let mut runner = runner("localhost:1", EngineOptions::default());
        runner.engine_mut().renderer_mut().write(b"kept renderer");

        let runner = runner
            .switch_session(Session::new("repo/other", "claude"))
            .await;

        assert_eq!(runner.engine().session().name, "repo/other");
        assert_eq!(runner.engine().state(), ConnectionState::Idle);
        assert!(!runner.engine().is_disposed());
        assert_eq!(runner.engine().renderer().written(), b"kept renderer".to_vec());
    }
}
