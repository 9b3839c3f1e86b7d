//! Local input handling
//!
//! Turns crossterm events into [`LocalEvent`]s. Keys become the byte
//! sequences an xterm-compatible PTY expects. `Ctrl-]` is an escape
//! prefix for client commands: `d` or `q` detaches, `p` asks for write
//! access, `r` resets the remote PTY, and a second `Ctrl-]` sends a
//! literal `0x1d`.

use bytes::Bytes;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use tether_client::{ContainerSize, LocalEvent};
use tether_protocol::Dimensions;

const ESCAPE_BYTE: u8 = 0x1d;

/// Maps terminal events to session events, tracking the escape prefix
#[derive(Debug, Default)]
pub struct InputMapper {
    escape_pending: bool,
}

impl InputMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escape_pending(&self) -> bool {
        self.escape_pending
    }

    pub fn map_event(&mut self, event: Event) -> Option<LocalEvent> {
        match event {
            Event::Key(key) => self.map_key(&key),
            Event::Paste(text) => {
                self.escape_pending = false;
                Some(LocalEvent::Input(Bytes::from(text)))
            }
            Event::Resize(cols, rows) => Some(LocalEvent::Resize(Dimensions::new(cols, rows))),
            Event::FocusGained => Some(LocalEvent::Focus(true)),
            Event::FocusLost => Some(LocalEvent::Focus(false)),
            Event::Mouse(_) => None,
        }
    }

    pub fn map_key(&mut self, key: &KeyEvent) -> Option<LocalEvent> {
        if key.kind == KeyEventKind::Release {
            return None;
        }

        if std::mem::take(&mut self.escape_pending) {
            return self.escape_command(key);
        }
        if is_escape_key(key) {
            self.escape_pending = true;
            return None;
        }
        key_bytes(key).map(|bytes| LocalEvent::Input(Bytes::from(bytes)))
    }

    fn escape_command(&mut self, key: &KeyEvent) -> Option<LocalEvent> {
        if is_escape_key(key) {
            return Some(LocalEvent::Input(Bytes::from_static(&[ESCAPE_BYTE])));
        }
        match key.code {
            KeyCode::Char('d') | KeyCode::Char('q') => Some(LocalEvent::Detach),
            KeyCode::Char('p') => Some(LocalEvent::Promote),
            KeyCode::Char('r') => Some(LocalEvent::Reset),
            // Anything else cancels the prefix and is typed as usual
            _ => key_bytes(key).map(|bytes| LocalEvent::Input(Bytes::from(bytes))),
        }
    }
}

/// Container size in pixels, when the terminal reports one
pub fn container_size() -> Option<ContainerSize> {
    let size = crossterm::terminal::window_size().ok()?;
    if size.width == 0 || size.height == 0 {
        return None;
    }
    Some(ContainerSize::new(size.width as u32, size.height as u32))
}

fn is_escape_key(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(']') | KeyCode::Char('5'))
}

/// Byte sequence for a key, `None` for keys the PTY has no use for
pub fn key_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let mods = key.modifiers;
    let bytes = match key.code {
        KeyCode::Char(c) => char_bytes(c, mods),
        KeyCode::Enter => alt_prefixed(mods, vec![b'\r']),
        KeyCode::Tab if mods.contains(KeyModifiers::SHIFT) => b"\x1b[Z".to_vec(),
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace => alt_prefixed(mods, vec![0x7f]),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => letter_key(b'A', mods),
        KeyCode::Down => letter_key(b'B', mods),
        KeyCode::Right => letter_key(b'C', mods),
        KeyCode::Left => letter_key(b'D', mods),
        KeyCode::Home => letter_key(b'H', mods),
        KeyCode::End => letter_key(b'F', mods),
        KeyCode::Insert => tilde_key(2, mods),
        KeyCode::Delete => tilde_key(3, mods),
        KeyCode::PageUp => tilde_key(5, mods),
        KeyCode::PageDown => tilde_key(6, mods),
        KeyCode::F(n) => function_key(n, mods)?,
        KeyCode::Null => vec![0],
        _ => return None,
    };
    Some(bytes)
}

fn char_bytes(c: char, mods: KeyModifiers) -> Vec<u8> {
    let base = if mods.contains(KeyModifiers::CONTROL) {
        control_byte(c).map(|b| vec![b])
    } else {
        None
    };
    let base = base.unwrap_or_else(|| {
        let mut buf = [0u8; 4];
        c.encode_utf8(&mut buf).as_bytes().to_vec()
    });
    alt_prefixed(mods, base)
}

/// C0 control code for Ctrl+`c`
fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' => Some(c.to_ascii_lowercase() as u8 - b'a' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

/// Alt sends ESC before the key
fn alt_prefixed(mods: KeyModifiers, bytes: Vec<u8>) -> Vec<u8> {
    if mods.contains(KeyModifiers::ALT) {
        let mut out = Vec::with_capacity(bytes.len() + 1);
        out.push(0x1b);
        out.extend(bytes);
        out
    } else {
        bytes
    }
}

/// xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4)
fn modifier_param(mods: KeyModifiers) -> u8 {
    let mut param = 1;
    if mods.contains(KeyModifiers::SHIFT) {
        param += 1;
    }
    if mods.contains(KeyModifiers::ALT) {
        param += 2;
    }
    if mods.contains(KeyModifiers::CONTROL) {
        param += 4;
    }
    param
}

fn has_modifiers(mods: KeyModifiers) -> bool {
    mods.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT | KeyModifiers::CONTROL)
}

/// `CSI <letter>`, or `CSI 1;<mod> <letter>` when modified
fn letter_key(letter: u8, mods: KeyModifiers) -> Vec<u8> {
    if has_modifiers(mods) {
        format!("\x1b[1;{}{}", modifier_param(mods), letter as char).into_bytes()
    } else {
        vec![0x1b, b'[', letter]
    }
}

/// `CSI <n>~`, or `CSI <n>;<mod>~` when modified
fn tilde_key(n: u8, mods: KeyModifiers) -> Vec<u8> {
    if has_modifiers(mods) {
        format!("\x1b[{};{}~", n, modifier_param(mods)).into_bytes()
    } else {
        format!("\x1b[{}~", n).into_bytes()
    }
}

fn function_key(n: u8, mods: KeyModifiers) -> Option<Vec<u8>> {
    match n {
        // F1-F4 are SS3 letters unless modified
        1..=4 => {
            let letter = b'P' + (n - 1);
            if has_modifiers(mods) {
                Some(format!("\x1b[1;{}{}", modifier_param(mods), letter as char).into_bytes())
            } else {
                Some(vec![0x1b, b'O', letter])
            }
        }
        5..=20 => {
            const CODES: [u8; 16] = [15, 17, 18, 19, 20, 21, 23, 24, 25, 26, 28, 29, 31, 32, 33, 34];
            Some(tilde_key(CODES[(n - 5) as usize], mods))
        }
        _ => None,
    }
}
