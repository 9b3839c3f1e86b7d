//! Buffered screen replay
//!
//! On (re)connect the host replays its scrollback between `buffer-size` and
//! `buffer-complete`. Frames in between are held back and written in one
//! batch, so the screen never shows a half-replayed state.

use bytes::Bytes;
use tether_protocol::Dimensions;

use crate::renderer::Renderer;

#[derive(Debug, Default)]
pub struct BufferReplay {
    frames: Vec<Bytes>,
    buffering: bool,
}

impl BufferReplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    /// Start holding frames back
    ///
    /// The renderer is resized to the size the replay was captured at, so
    /// cursor addressing in the replayed bytes lands where the host meant.
    /// A repeated `begin` while already buffering keeps what was collected.
    pub fn begin<R: Renderer>(&mut self, dims: Dimensions, renderer: &mut R) {
        if dims.is_valid() && renderer.size() != dims {
            tracing::debug!(from = %renderer.size(), to = %dims, "Resizing renderer for replay");
            renderer.resize(dims);
            renderer.refresh(0..dims.rows);
        }
        if self.buffering {
            tracing::debug!(held = self.frames.len(), "Replay restarted while buffering");
        }
        self.buffering = true;
    }

    /// Hold `data` back while buffering
    ///
    /// Returns the data untouched when not buffering so the caller can
    /// write it through.
    pub fn push(&mut self, data: Bytes) -> Option<Bytes> {
        if self.buffering {
            self.frames.push(data);
            None
        } else {
            Some(data)
        }
    }

    /// Write everything held back as one update and stop buffering
    ///
    /// An empty replay leaves the renderer untouched. Returns whether
    /// anything was written.
    pub fn complete<R: Renderer>(&mut self, renderer: &mut R) -> bool {
        self.buffering = false;
        if self.frames.is_empty() {
            return false;
        }

        let frames = std::mem::take(&mut self.frames);
        tracing::debug!(frames = frames.len(), "Replaying buffered output");
        renderer.clear();
        renderer.write_batch(&frames);
        true
    }

    /// Drop anything held back without writing it
    pub fn discard(&mut self) {
        self.frames.clear();
        self.buffering = false;
    }
}
