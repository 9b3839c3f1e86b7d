//! tether-client: Client side of the remote PTY session protocol
//!
//! The [`engine`] is a sans-IO state machine that turns socket frames and
//! local events into renderer calls and outbound messages. A
//! [`session::SessionRunner`] drives it over a [`connection::Connection`].

pub mod config;
pub mod connection;
pub mod engine;
pub mod renderer;
pub mod session;

pub use config::{load_config, load_config_from, ClientConfig};
pub use connection::{ConnectOutcome, Connection, ConnectionEvent, ReconnectLimiter};
pub use engine::{
    AccessMode, ConnectionState, Engine, EngineOptions, InputOutcome, ServerFault,
    SessionObserver,
};
pub use renderer::{AnsiRenderer, ContainerSize, CursorStyle, FontSize, RenderError, Renderer};
pub use session::{LocalEvent, SessionEnd, SessionRunner};
