//! Frame classification and encoding
//!
//! The PTY socket mixes raw terminal output with JSON control messages.
//! [`decode_frame`] is the one place that tells them apart; callers never
//! sniff payloads themselves.

use bytes::Bytes;

use crate::messages::{Inbound, Outbound, ServerControl};

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A WebSocket payload, independent of the transport library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify one inbound frame
///
/// Binary frames are always terminal data. Text frames become a control
/// message only when they parse as JSON with a known `type` and the fields
/// that type needs; everything else is literal terminal text. This never
/// fails.
pub fn decode_frame(frame: Frame) -> Inbound {
    match frame {
        Frame::Binary(data) => Inbound::Data(data),
        Frame::Text(text) => {
            if !text.trim_start().starts_with('{') {
                return Inbound::Data(Bytes::from(text));
            }

            match serde_json::from_str::<ServerControl>(&text) {
                Ok(control) => Inbound::Control(control),
                Err(e) => {
                    tracing::trace!(error = %e, len = text.len(), "Text frame is not a control message");
                    Inbound::Data(Bytes::from(text))
                }
            }
        }
    }
}

/// Encode an outbound message as a frame
///
/// Control messages travel as JSON text. Keystrokes travel as binary so the
/// host never mistakes typed JSON for a control message.
pub fn encode_outbound(msg: &Outbound) -> Result<Frame, CodecError> {
    match msg {
        Outbound::Control(control) => Ok(Frame::Text(serde_json::to_string(control)?)),
        Outbound::Input(data) => Ok(Frame::Binary(data.clone())),
    }
}
