//! Read-only / writable access tracking

use crate::renderer::{CursorStyle, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Writable,
    ReadOnly,
}

/// Access mode as last reported by the host
///
/// Only the host moves this. Asking for promotion does not change it.
#[derive(Debug, Default)]
pub struct AccessControl {
    mode: AccessMode,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn allows_input(&self) -> bool {
        self.mode == AccessMode::Writable
    }

    /// Apply a `read-only` message, returning the new mode if it changed
    pub fn apply<R: Renderer>(&mut self, read_only: bool, renderer: &mut R) -> Option<AccessMode> {
        let next = if read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::Writable
        };
        if next == self.mode {
            return None;
        }

        self.mode = next;
        match next {
            AccessMode::ReadOnly => renderer.set_cursor_style(CursorStyle::HIDDEN),
            AccessMode::Writable => renderer.set_cursor_style(CursorStyle::default()),
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{Call, RecordingRenderer};
    use tether_protocol::Dimensions;

    #[test]
    fn test_starts_writable() {
        let access = AccessControl::new();
        assert_eq!(access.mode(), AccessMode::Writable);
        assert!(access.allows_input());
    }

    #[test]
    fn test_transitions_set_cursor() {
        let mut renderer = RecordingRenderer::new(Dimensions::new(80, 24));
        let mut access = AccessControl::new();

        assert_eq!(access.apply(true, &mut renderer), Some(AccessMode::ReadOnly));
        assert!(!access.allows_input());
        assert_eq!(access.apply(true, &mut renderer), None);
        assert_eq!(access.apply(false, &mut renderer), Some(AccessMode::Writable));

        assert_eq!(
            renderer.calls,
            vec![
                Call::Cursor(CursorStyle::HIDDEN),
                Call::Cursor(CursorStyle::default()),
            ]
        );
    }
}
