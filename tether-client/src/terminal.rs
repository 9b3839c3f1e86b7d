//! Terminal mode management
//!
//! Puts the local terminal in raw mode on the alternate screen for the
//! lifetime of a [`TerminalGuard`] and restores it on drop.

use std::io::{self, Write};

use crossterm::{
    cursor::Show,
    event::{DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle},
};

use tether_utils::Result;

pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    /// Enter raw mode and the alternate screen
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;

        let mut stdout = io::stdout();
        if let Err(e) = execute!(
            stdout,
            EnterAlternateScreen,
            EnableBracketedPaste,
            EnableFocusChange
        ) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }

        Ok(Self { _private: () })
    }

    /// Restore terminal to original state
    fn restore() -> Result<()> {
        disable_raw_mode()?;
        execute!(
            io::stdout(),
            DisableFocusChange,
            DisableBracketedPaste,
            Show,
            LeaveAlternateScreen
        )?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = Self::restore() {
            tracing::error!("Failed to restore terminal: {}", e);
        }
    }
}

pub fn set_title(title: &str) {
    if let Err(e) = execute!(io::stdout(), SetTitle(title)) {
        tracing::debug!("Failed to set terminal title: {}", e);
    }
}

/// Ring the terminal bell
pub fn bell() {
    let mut stdout = io::stdout();
    if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
        tracing::debug!("Failed to ring bell: {}", e);
    }
}
