//! tether-protocol: Wire definitions for the remote PTY session protocol
//!
//! One WebSocket carries two kinds of traffic: raw terminal bytes and JSON
//! control messages. This crate defines the control vocabulary in both
//! directions, the single decode step that tells them apart, and the
//! endpoint URL a client connects to.

pub mod codec;
pub mod endpoint;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{decode_frame, encode_outbound, CodecError, Frame};
pub use endpoint::{pty_url, EndpointError, PTY_PATH};
pub use messages::{ClientControl, Inbound, Outbound, ServerControl};
pub use types::{Dimensions, Session};
