//! Control message types for both directions of the PTY socket

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Control messages sent by the PTY host
///
/// Encoded as JSON text frames, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerControl {
    /// The host is about to replay buffered output captured at this size
    BufferSize { cols: u16, rows: u16 },

    /// Buffer replay finished (sent even when nothing was replayed)
    BufferComplete,

    /// Access mode for this connection
    ReadOnly {
        #[serde(rename = "data")]
        value: bool,
    },

    /// The host refused or lost the session
    Error {
        /// Short error identifier
        #[serde(default)]
        error: String,
        /// Human-readable description
        #[serde(default)]
        message: String,
        /// Machine-readable code, e.g. `WORKTREE_NOT_FOUND`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// Control messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientControl {
    /// Client finished its initial layout and wants the buffer replayed
    Ready,

    /// Client viewport changed
    Resize { cols: u16, rows: u16 },

    /// Type `data` into the PTY, followed by Enter when `submit` is set
    Prompt { data: String, submit: bool },

    /// Ask for write access while read-only
    Promote,

    /// Client window gained or lost focus
    Focus { focused: bool },

    /// Tear down and recreate the PTY behind this session
    Reset,
}

impl ClientControl {
    pub fn resize(dims: Dimensions) -> Self {
        Self::Resize {
            cols: dims.cols,
            rows: dims.rows,
        }
    }

    /// Initial prompt injection; always submitted
    pub fn prompt(data: impl Into<String>) -> Self {
        Self::Prompt {
            data: data.into(),
            submit: true,
        }
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Raw terminal output
    Data(Bytes),
    /// Typed control message
    Control(ServerControl),
}

/// Something the client wants to put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Typed control message
    Control(ClientControl),
    /// Raw keystroke bytes for the PTY
    Input(Bytes),
}

impl From<ClientControl> for Outbound {
    fn from(msg: ClientControl) -> Self {
        Self::Control(msg)
    }
}
