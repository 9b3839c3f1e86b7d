//! WebSocket connection management
//!
//! Provides one WebSocket per session to the PTY host, with a minimum
//! interval between physical connects.

mod client;
mod limiter;

pub use client::{ConnectOutcome, Connection, ConnectionEvent};
pub use limiter::{ReconnectLimiter, DEFAULT_RECONNECT_INTERVAL};
