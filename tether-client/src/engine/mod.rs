//! Session protocol engine
//!
//! One [`Engine`] per attached session. It is sans-IO: the driver feeds it
//! socket events, local events and the current time, then drains
//! [`Engine::take_outbound`] onto the socket and sleeps until
//! [`Engine::next_deadline`]. Everything that touches the screen goes
//! through the [`Renderer`].
//!
//! State flow for one socket:
//!
//! ```text
//! Idle -> Connecting -> Open -> Buffering -> Ready
//!                        |         |          |
//!                        +---------+----------+--> Closed | Errored
//! ```

pub mod access;
pub mod dimensions;
pub mod replay;
pub mod timers;


use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tether_protocol::{
    decode_frame, ClientControl, Dimensions, Frame, Inbound, Outbound, ServerControl, Session,
};
use tether_utils::TetherError;

use crate::renderer::{ContainerSize, RenderError, Renderer};

pub use access::{AccessControl, AccessMode};
pub use dimensions::DimensionNegotiator;
pub use replay::BufferReplay;
pub use timers::{TimerKind, Timers};

/// Default debounce for size changes
pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Default delay between replay completion and the final fit
pub const DEFAULT_FIT_SETTLE: Duration = Duration::from_millis(100);

/// Per-session engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Typed into a fresh agent session once, after Ready
    pub initial_prompt: Option<String>,
    /// How long to let the agent start before typing the prompt
    pub prompt_delay: Duration,
    pub resize_debounce: Duration,
    pub fit_settle: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            initial_prompt: None,
            prompt_delay: Duration::ZERO,
            resize_debounce: DEFAULT_RESIZE_DEBOUNCE,
            fit_settle: DEFAULT_FIT_SETTLE,
        }
    }
}

/// Connection state of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    /// Holding back replayed output
    Buffering,
    Ready,
    Closed,
    Errored,
}

impl ConnectionState {
    /// Whether the socket is up and accepting sends
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::Buffering | Self::Ready)
    }
}

/// Error reported by the host in an `error` control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFault {
    pub error: String,
    pub message: String,
    pub code: Option<String>,
}

impl ServerFault {
    /// Text to show the user
    pub fn summary(&self) -> &str {
        if self.message.is_empty() {
            &self.error
        } else {
            &self.message
        }
    }
}

impl fmt::Display for ServerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.summary(), code),
            None => write!(f, "{}", self.summary()),
        }
    }
}

impl From<ServerFault> for TetherError {
    fn from(fault: ServerFault) -> Self {
        let code = fault.code.clone().unwrap_or_else(|| fault.error.clone());
        TetherError::server(code, fault.summary())
    }
}

/// Callbacks from the engine to its owner
///
/// All methods default to no-ops.
pub trait SessionObserver {
    /// Socket opened (`true`) or went away (`false`)
    fn on_connected(&mut self, _connected: bool) {}

    fn on_state_changed(&mut self, _state: ConnectionState) {}

    fn on_access_mode_changed(&mut self, _mode: AccessMode) {}

    /// Local input was refused because the session is read-only
    fn on_input_rejected(&mut self) {}

    fn on_server_error(&mut self, _fault: &ServerFault) {}
}

impl SessionObserver for () {}

/// What happened to a piece of local input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Sent,
    /// Refused because the session is read-only
    Rejected,
    /// No open socket to send on
    Dropped,
}

/// Protocol state machine for one session
pub struct Engine<R: Renderer, O: SessionObserver> {
    session: Session,
    options: EngineOptions,
    renderer: R,
    observer: O,
    state: ConnectionState,
    replay: BufferReplay,
    dims: DimensionNegotiator,
    access: AccessControl,
    timers: Timers,
    outbound: Vec<Outbound>,
    pending_prompt: Option<String>,
    server_fault: Option<ServerFault>,
    /// A socket exists that has not yet been reported as gone
    socket_live: bool,
    disposed: bool,
}

impl<R: Renderer, O: SessionObserver> Engine<R, O> {
    pub fn new(session: Session, options: EngineOptions, renderer: R, observer: O) -> Self {
        let pending_prompt = options
            .initial_prompt
            .clone()
            .filter(|prompt| !prompt.is_empty());
        Self {
            session,
            options,
            renderer,
            observer,
            state: ConnectionState::Idle,
            replay: BufferReplay::new(),
            dims: DimensionNegotiator::new(),
            access: AccessControl::new(),
            timers: Timers::new(),
            outbound: Vec::new(),
            pending_prompt,
            server_fault: None,
            socket_live: false,
            disposed: false,
        }
    }

    /// Attach the renderer to its output
    ///
    /// Failing to open is fatal. Failing to enable the accelerated path is
    /// not; the renderer stays on its plain path.
    pub fn mount(&mut self) -> Result<(), RenderError> {
        self.renderer.open()?;
        if let Err(e) = self.renderer.enable_accelerated() {
            tracing::warn!("Accelerated rendering disabled: {}", e);
        }
        self.dims.record_measured(self.renderer.size());
        Ok(())
    }

    // ==================== Socket events ====================

    /// A new socket is being opened for this session
    pub fn on_connecting(&mut self) {
        if self.disposed {
            return;
        }
        self.replay.discard();
        self.timers.clear();
        self.outbound.clear();
        self.dims.reset_for_reconnect();
        self.server_fault = None;
        self.socket_live = true;
        self.set_state(ConnectionState::Connecting);
    }

    /// The socket opened: fit, then announce readiness
    pub fn on_open(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        if self.state.is_open() {
            tracing::warn!(state = ?self.state, "Ignoring open on an already open session");
            return;
        }

        self.socket_live = true;
        self.set_state(ConnectionState::Open);
        self.observer.on_connected(true);

        self.renderer.fit();
        self.dims.record_measured(self.renderer.size());
        self.push(ClientControl::Ready);
        tracing::info!(session = %self.session.label(), "Session open, sent ready");

        if self.pending_prompt.is_some() {
            if self.options.prompt_delay.is_zero() {
                self.send_prompt();
            } else {
                self.timers
                    .arm(TimerKind::PromptSettle, now, self.options.prompt_delay);
            }
        }
    }

    /// One inbound frame, in arrival order
    pub fn on_frame(&mut self, frame: Frame, now: Instant) {
        if self.disposed {
            return;
        }
        if !self.state.is_open() {
            tracing::trace!(state = ?self.state, len = frame.len(), "Dropping frame outside an open session");
            return;
        }

        match decode_frame(frame) {
            Inbound::Data(data) => {
                if let Some(data) = self.replay.push(data) {
                    self.renderer.write(&data);
                }
            }
            Inbound::Control(control) => self.on_control(control, now),
        }
    }

    fn on_control(&mut self, control: ServerControl, now: Instant) {
        tracing::debug!(?control, "Control message");
        match control {
            ServerControl::BufferSize { cols, rows } => {
                let dims = Dimensions::new(cols, rows);
                self.dims.server_size(dims);
                self.replay.begin(dims, &mut self.renderer);
                self.set_state(ConnectionState::Buffering);
            }
            ServerControl::BufferComplete => {
                self.replay.complete(&mut self.renderer);
                self.timers
                    .arm(TimerKind::FitSettle, now, self.options.fit_settle);
                if self.state != ConnectionState::Ready {
                    self.set_state(ConnectionState::Ready);
                    self.flush_resize();
                }
            }
            ServerControl::ReadOnly { value } => {
                if let Some(mode) = self.access.apply(value, &mut self.renderer) {
                    tracing::info!(?mode, "Access mode changed");
                    self.observer.on_access_mode_changed(mode);
                }
            }
            ServerControl::Error {
                error,
                message,
                code,
            } => {
                let fault = ServerFault {
                    error,
                    message,
                    code,
                };
                tracing::error!(session = %self.session.label(), "Server error: {}", fault);
                self.replay.discard();
                self.timers.clear();
                self.outbound.clear();
                self.set_state(ConnectionState::Errored);
                self.observer.on_server_error(&fault);
                self.server_fault = Some(fault);
            }
        }
    }

    /// The socket closed
    pub fn on_closed(&mut self, reason: Option<&str>) {
        if self.disposed {
            return;
        }
        tracing::info!(session = %self.session.label(), reason = reason.unwrap_or(""), "Socket closed");
        self.shut_down(ConnectionState::Closed);
    }

    /// The socket failed to open or broke
    pub fn on_transport_error(&mut self, err: &TetherError) {
        if self.disposed {
            return;
        }
        tracing::error!(session = %self.session.label(), "Transport error: {}", err);
        self.shut_down(ConnectionState::Errored);
    }

    fn shut_down(&mut self, state: ConnectionState) {
        self.replay.discard();
        self.timers.clear();
        self.outbound.clear();
        // A server error already explains why the session is unusable
        if self.state != ConnectionState::Errored {
            self.set_state(state);
        }
        if self.socket_live {
            self.socket_live = false;
            self.observer.on_connected(false);
        }
    }

    // ==================== Local events ====================

    /// Keystrokes or pasted text from the user
    pub fn on_local_input(&mut self, data: Bytes) -> InputOutcome {
        if self.disposed || data.is_empty() {
            return InputOutcome::Dropped;
        }
        if !self.access.allows_input() {
            tracing::debug!(len = data.len(), "Input rejected while read-only");
            self.observer.on_input_rejected();
            return InputOutcome::Rejected;
        }
        if !self.state.is_open() {
            return InputOutcome::Dropped;
        }
        self.outbound.push(Outbound::Input(data));
        InputOutcome::Sent
    }

    /// The renderer's grid changed size; remeasured when the debounce settles
    pub fn on_local_resize(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        self.timers
            .arm(TimerKind::ResizeDebounce, now, self.options.resize_debounce);
    }

    /// The renderer's container changed size
    pub fn on_container_resize(&mut self, size: ContainerSize, now: Instant) {
        if self.disposed {
            return;
        }
        self.dims.observe_container(size);
        self.timers
            .arm(TimerKind::ResizeDebounce, now, self.options.resize_debounce);
    }

    pub fn on_focus(&mut self, focused: bool) {
        if self.disposed || !self.state.is_open() {
            return;
        }
        self.push(ClientControl::Focus { focused });
    }

    /// Ask the host for write access
    ///
    /// Returns whether a request was sent. The mode only changes when the
    /// host says so.
    pub fn request_promotion(&mut self) -> bool {
        if self.disposed || !self.state.is_open() || self.access.allows_input() {
            return false;
        }
        tracing::info!(session = %self.session.label(), "Requesting write access");
        self.push(ClientControl::Promote);
        true
    }

    /// Ask the host to recreate the PTY behind this session
    pub fn request_reset(&mut self) -> bool {
        if self.disposed || !self.state.is_open() {
            return false;
        }
        tracing::info!(session = %self.session.label(), "Requesting session reset");
        self.push(ClientControl::Reset);
        true
    }

    // ==================== Timers ====================

    /// Run every timer due at `now`
    pub fn poll_timers(&mut self, now: Instant) {
        if self.disposed {
            return;
        }
        for kind in self.timers.take_expired(now) {
            match kind {
                TimerKind::ResizeDebounce => {
                    self.dims.settle(&mut self.renderer);
                    self.flush_resize();
                }
                TimerKind::FitSettle => {
                    self.renderer.fit();
                    self.renderer.scroll_to_bottom();
                    let size = self.renderer.size();
                    self.renderer.refresh(0..size.rows);
                    self.dims.record_measured(size);
                    self.flush_resize();
                }
                TimerKind::PromptSettle => self.send_prompt(),
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        if self.disposed {
            return None;
        }
        self.timers.next_deadline()
    }

    /// Drain messages waiting to go on the socket
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    /// Tear down: cancel every timer and stop reacting to events
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        tracing::debug!(session = %self.session.label(), "Disposing engine");
        self.disposed = true;
        self.timers.clear();
        self.replay.discard();
        self.outbound.clear();
        self.socket_live = false;
        self.state = ConnectionState::Closed;
    }

    pub fn into_parts(self) -> (R, O) {
        (self.renderer, self.observer)
    }

    // ==================== Accessors ====================

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access.mode()
    }

    pub fn server_fault(&self) -> Option<&ServerFault> {
        self.server_fault.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    // ==================== Internals ====================

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?state, "Connection state");
        self.state = state;
        self.observer.on_state_changed(state);
    }

    fn push(&mut self, control: ClientControl) {
        self.outbound.push(Outbound::Control(control));
    }

    /// Report the measured size if the host is ready for it
    fn flush_resize(&mut self) {
        if self.state != ConnectionState::Ready {
            return;
        }
        if let Some(dims) = self.dims.flush() {
            tracing::debug!(%dims, "Sending resize");
            self.push(ClientControl::resize(dims));
        }
    }

    fn send_prompt(&mut self) {
        if !self.state.is_open() {
            return;
        }
        if let Some(prompt) = self.pending_prompt.take() {
            tracing::info!(len = prompt.len(), "Sending initial prompt");
            self.push(ClientControl::prompt(prompt));
        }
    }
}
