//! Renderer that records every call, for tests

use std::ops::Range;

use tether_protocol::Dimensions;

use super::{CursorStyle, FontSize, RenderError, Renderer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(Vec<u8>),
    Resize(Dimensions),
    Refresh(Range<u16>),
    Clear,
    ScrollToBottom,
    Fit,
    FontSize(FontSize),
    Cursor(CursorStyle),
}

#[derive(Debug)]
pub struct RecordingRenderer {
    pub calls: Vec<Call>,
    pub size: Dimensions,
    /// Size `fit` snaps to, standing in for the container
    pub fit_to: Dimensions,
    pub accelerated: bool,
    pub fail_accelerated: bool,
}

impl RecordingRenderer {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            calls: Vec::new(),
            size: dims,
            fit_to: dims,
            accelerated: false,
            fail_accelerated: false,
        }
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn written(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn enable_accelerated(&mut self) -> Result<(), RenderError> {
        if self.fail_accelerated {
            return Err(RenderError::AcceleratedUnavailable("test".into()));
        }
        self.accelerated = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) {
        self.calls.push(Call::Write(data.to_vec()));
    }

    fn resize(&mut self, dims: Dimensions) {
        self.size = dims;
        self.calls.push(Call::Resize(dims));
    }

    fn refresh(&mut self, rows: Range<u16>) {
        self.calls.push(Call::Refresh(rows));
    }

    fn clear(&mut self) {
        self.calls.push(Call::Clear);
    }

    fn scroll_to_bottom(&mut self) {
        self.calls.push(Call::ScrollToBottom);
    }

    fn fit(&mut self) {
        self.size = self.fit_to;
        self.calls.push(Call::Fit);
    }

    fn size(&self) -> Dimensions {
        self.size
    }

    fn set_font_size(&mut self, size: FontSize) {
        self.calls.push(Call::FontSize(size));
    }

    fn set_cursor_style(&mut self, style: CursorStyle) {
        self.calls.push(Call::Cursor(style));
    }
}
