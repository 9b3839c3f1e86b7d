//! Grid size negotiation with the host
//!
//! Local size signals are collected here and only turned into a size to
//! report once the engine says the channel is ready. The negotiator
//! remembers the size the host last knew about so unchanged sizes are
//! never resent.

use tether_protocol::Dimensions;

use crate::renderer::{ContainerSize, FontSize, Renderer};

#[derive(Debug, Default)]
pub struct DimensionNegotiator {
    /// Container size seen since the last settle
    pending_container: Option<ContainerSize>,
    font_size: Option<FontSize>,
    measured: Option<Dimensions>,
    last_sent: Option<Dimensions>,
}

impl DimensionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_container(&mut self, size: ContainerSize) {
        self.pending_container = Some(size);
    }

    /// Apply everything observed since the last settle
    ///
    /// Picks the font size for the latest container size, fits the
    /// renderer and records what it measures. The renderer's own size
    /// after the fit is authoritative.
    pub fn settle<R: Renderer>(&mut self, renderer: &mut R) {
        if let Some(container) = self.pending_container.take() {
            let font = FontSize::for_container(container);
            if self.font_size != Some(font) {
                tracing::debug!(?font, width = container.width, height = container.height, "Font size changed");
                renderer.set_font_size(font);
                self.font_size = Some(font);
            }
        }
        renderer.fit();
        self.record_measured(renderer.size());
    }

    pub fn record_measured(&mut self, dims: Dimensions) {
        if dims.is_valid() {
            self.measured = Some(dims);
        }
    }

    /// The host told us the size it captured its buffer at
    pub fn server_size(&mut self, dims: Dimensions) {
        self.last_sent = Some(dims);
    }

    /// Size to report, if it differs from what the host already knows
    ///
    /// Only call while the channel is ready; a returned size counts as sent.
    pub fn flush(&mut self) -> Option<Dimensions> {
        let measured = self.measured?;
        if self.last_sent == Some(measured) {
            return None;
        }
        self.last_sent = Some(measured);
        Some(measured)
    }

    pub fn measured(&self) -> Option<Dimensions> {
        self.measured
    }

    pub fn last_sent(&self) -> Option<Dimensions> {
        self.last_sent
    }

    pub fn font_size(&self) -> Option<FontSize> {
        self.font_size
    }

    /// A new socket starts with a host that knows nothing about us
    pub fn reset_for_reconnect(&mut self) {
        self.last_sent = None;
    }
}
