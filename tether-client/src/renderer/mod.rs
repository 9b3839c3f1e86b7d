//! Renderer seam
//!
//! The engine never draws anything itself. It drives a [`Renderer`], an
//! opaque sink that owns the actual terminal emulator or output device.

mod ansi;
#[cfg(test)]
pub(crate) mod recording;

use std::ops::Range;

use bytes::Bytes;
use tether_protocol::Dimensions;

pub use ansi::AnsiRenderer;

/// Renderer failures
///
/// Only [`Renderer::open`] failures are fatal. A failed accelerated path
/// is logged and the renderer keeps running on its plain path.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Accelerated rendering unavailable: {0}")]
    AcceleratedUnavailable(String),

    #[error("Failed to open renderer: {0}")]
    Open(#[from] std::io::Error),
}

impl From<RenderError> for tether_utils::TetherError {
    fn from(err: RenderError) -> Self {
        tether_utils::TetherError::Render(err.to_string())
    }
}

/// Cursor appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorStyle {
    pub visible: bool,
    pub blink: bool,
}

impl CursorStyle {
    /// Transparent, non-blinking cursor shown while input is refused
    pub const HIDDEN: Self = Self {
        visible: false,
        blink: false,
    };
}

impl Default for CursorStyle {
    fn default() -> Self {
        Self {
            visible: true,
            blink: true,
        }
    }
}

/// Viewport size of the renderer's container, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

impl ContainerSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Font size steps chosen from the container size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    Small,
    Medium,
    Large,
}

impl FontSize {
    /// Step function over the container size
    ///
    /// Narrow containers (< 400px) get the smallest font, medium width
    /// (< 600px) or short (< 400px) containers get the medium one.
    pub fn for_container(size: ContainerSize) -> Self {
        if size.width < 400 {
            FontSize::Small
        } else if size.width < 600 || size.height < 400 {
            FontSize::Medium
        } else {
            FontSize::Large
        }
    }
}

/// Output device driven by the session engine
pub trait Renderer {
    /// Attach to the output device
    fn open(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Try to switch to an accelerated output path
    fn enable_accelerated(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Write raw terminal bytes
    fn write(&mut self, data: &[u8]);

    /// Write several chunks as one visual update
    fn write_batch(&mut self, chunks: &[Bytes]) {
        for chunk in chunks {
            self.write(chunk);
        }
    }

    /// Set the grid size
    fn resize(&mut self, dims: Dimensions);

    /// Repaint the given rows synchronously
    fn refresh(&mut self, rows: Range<u16>);

    /// Clear the screen and scrollback
    fn clear(&mut self);

    fn scroll_to_bottom(&mut self);

    /// Resize the grid to fill the container
    fn fit(&mut self);

    /// Current grid size
    fn size(&self) -> Dimensions;

    fn set_font_size(&mut self, _size: FontSize) {}

    fn set_cursor_style(&mut self, style: CursorStyle);
}
