//! Pass-through renderer for a real terminal
//!
//! The remote PTY already emits ANSI, so the local terminal is the emulator:
//! bytes go straight to the writer and grid operations become terminal
//! control sequences.

use std::io::{self, IsTerminal, Stdout, Write};
use std::ops::Range;

use bytes::Bytes;
use crossterm::{
    cursor::{Hide, MoveTo, SetCursorStyle, Show},
    queue,
    terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate},
};
use tether_protocol::Dimensions;

use super::{CursorStyle, RenderError, Renderer};

type Measure = Box<dyn Fn() -> Option<Dimensions> + Send>;

/// Renderer writing ANSI output to any [`Write`]
pub struct AnsiRenderer<W: Write> {
    out: W,
    size: Dimensions,
    measure: Measure,
    /// Whether the writer is a terminal that understands synchronized updates
    sync_capable: bool,
    accelerated: bool,
    cursor: CursorStyle,
}

impl AnsiRenderer<Stdout> {
    /// Renderer over the process's stdout, measured with the terminal size
    pub fn stdout() -> Self {
        let sync_capable = io::stdout().is_terminal();
        Self::new(io::stdout(), sync_capable, || {
            crossterm::terminal::size()
                .ok()
                .map(|(cols, rows)| Dimensions::new(cols, rows))
        })
    }
}

impl<W: Write> AnsiRenderer<W> {
    pub fn new<F>(out: W, sync_capable: bool, measure: F) -> Self
    where
        F: Fn() -> Option<Dimensions> + Send + 'static,
    {
        Self {
            out,
            size: Dimensions::default(),
            measure: Box::new(measure),
            sync_capable,
            accelerated: false,
            cursor: CursorStyle::default(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    pub fn cursor_style(&self) -> CursorStyle {
        self.cursor
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush terminal output: {}", e);
        }
    }

    fn write_chunks(&mut self, chunks: &[Bytes]) -> io::Result<()> {
        for chunk in chunks {
            self.out.write_all(chunk)?;
        }
        Ok(())
    }
}

impl<W: Write> Renderer for AnsiRenderer<W> {
    fn open(&mut self) -> Result<(), RenderError> {
        let dims = (self.measure)()
            .filter(Dimensions::is_valid)
            .ok_or_else(|| {
                RenderError::Open(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "terminal size unavailable",
                ))
            })?;
        self.size = dims;
        Ok(())
    }

    fn enable_accelerated(&mut self) -> Result<(), RenderError> {
        if !self.sync_capable {
            return Err(RenderError::AcceleratedUnavailable(
                "output is not a terminal".into(),
            ));
        }
        self.accelerated = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) {
        if let Err(e) = self.out.write_all(data) {
            tracing::warn!("Failed to write terminal output: {}", e);
            return;
        }
        self.flush();
    }

    fn write_batch(&mut self, chunks: &[Bytes]) {
        let result = if self.accelerated {
            queue!(self.out, BeginSynchronizedUpdate)
                .and_then(|_| self.write_chunks(chunks))
                .and_then(|_| queue!(self.out, EndSynchronizedUpdate))
        } else {
            self.write_chunks(chunks)
        };
        if let Err(e) = result {
            tracing::warn!("Failed to write replay batch: {}", e);
        }
        self.flush();
    }

    fn resize(&mut self, dims: Dimensions) {
        // The local terminal cannot be resized from here; track the grid
        // the remote side is drawing for.
        self.size = dims;
    }

    fn refresh(&mut self, _rows: Range<u16>) {
        self.flush();
    }

    fn clear(&mut self) {
        if let Err(e) = queue!(self.out, Clear(ClearType::All), Clear(ClearType::Purge), MoveTo(0, 0)) {
            tracing::warn!("Failed to clear terminal: {}", e);
        }
        self.flush();
    }

    fn scroll_to_bottom(&mut self) {
        // Output always follows the bottom of a real terminal
        self.flush();
    }

    fn fit(&mut self) {
        if let Some(dims) = (self.measure)().filter(Dimensions::is_valid) {
            self.size = dims;
        }
    }

    fn size(&self) -> Dimensions {
        self.size
    }

    fn set_cursor_style(&mut self, style: CursorStyle) {
        let shape = if style.blink {
            SetCursorStyle::BlinkingBlock
        } else {
            SetCursorStyle::SteadyBlock
        };
        let result = if style.visible {
            queue!(self.out, Show, shape)
        } else {
            queue!(self.out, Hide, shape)
        };
        if let Err(e) = result {
            tracing::warn!("Failed to set cursor style: {}", e);
        }
        self.cursor = style;
        self.flush();
    }
}
