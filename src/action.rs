//! Bound actions
//!
//! # Action syntax
//!
//! ```text
//! >text            → PipeOut: write "text\n" to the output pipe on press
//! !command args    → Command: run "command args" through the interpreter on press
//! A                → Keys: hold A while the key is held
//! LEFTSHIFT+A      → Keys: chord, released in reverse order
//! KEY_A            → Keys: the KEY_ prefix is optional
//! -A               → Keys: entry sent as "up" instead of "down"
//! A B              → Keys: tap A on press, tap B on release
//! ```
//!
//! Actions are shared through `Arc` by every slot or zone bound to them, and
//! by profiles forked from the one they were bound in.

use crate::error::ActionError;
use crate::keys::{KeyState, KeyTables, INPUT_KEY_COUNT};
use tracing::debug;

/// Prefix selecting [`Action::PipeOut`].
pub const PIPE_OUT_PREFIX: char = '>';

/// Prefix selecting [`Action::Command`].
pub const COMMAND_PREFIX: char = '!';

/// A unit of behavior bound to a keypad key or a stick zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a key chord to the virtual device.
    Keys(KeyChord),
    /// Resubmit a command line to the interpreter on press.
    Command(String),
    /// Write a line to the output pipe on press (stored with its newline).
    PipeOut(String),
}

impl Action {
    /// Build an action from its textual form.
    pub fn parse(tables: &KeyTables, spec: &str) -> Result<Self, ActionError> {
        if spec.is_empty() {
            return Err(ActionError::Empty);
        }
        if let Some(text) = spec.strip_prefix(PIPE_OUT_PREFIX) {
            return Ok(Action::PipeOut(format!("{text}\n")));
        }
        if let Some(command) = spec.strip_prefix(COMMAND_PREFIX) {
            return Ok(Action::Command(command.to_string()));
        }
        KeyChord::parse(tables, spec).map(Action::Keys)
    }

    /// One-line description used by `dump`.
    pub fn describe(&self, tables: &KeyTables) -> String {
        match self {
            Action::Keys(chord) => format!("SEND KEYS: {}", chord.describe(tables)),
            Action::Command(command) => format!("COMMAND : {command:?}"),
            Action::PipeOut(text) => format!("WRITE PIPE : {text:?}"),
        }
    }
}

/// Key chord with an optional separate release chord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    press: Vec<KeyState>,
    release: Vec<KeyState>,
}

impl KeyChord {
    /// Parse `chord[ release_chord]`, each a `+`-separated list of key names.
    pub fn parse(tables: &KeyTables, spec: &str) -> Result<Self, ActionError> {
        let mut chords = spec.split_whitespace();
        let press = match chords.next() {
            Some(chord) => scan(tables, chord)?,
            None => return Err(ActionError::Empty),
        };
        let release = match chords.next() {
            Some(chord) => scan(tables, chord)?,
            None => Vec::new(),
        };
        Ok(Self { press, release })
    }

    /// Run the chord for a press (`true`) or release (`false`) edge.
    ///
    /// The "currently down" table only lives for this call, so a key left
    /// down by an earlier call is not known here. A chord holding `A` whose
    /// press is delivered twice without a release sends `down(A)` twice.
    pub fn act(&self, pressed: bool, send: impl FnMut(u16, bool)) {
        let mut out = ChordSender {
            down: vec![false; INPUT_KEY_COUNT],
            send,
        };

        if pressed {
            out.send_keys(&self.press);
            if !self.release.is_empty() {
                out.release_keys(&self.press);
            }
        } else if self.release.is_empty() {
            for key in &self.press {
                out.mark(key.code, key.down);
            }
            out.release_keys(&self.press);
        } else {
            out.send_keys(&self.release);
            out.release_keys(&self.release);
        }
    }

    fn describe(&self, tables: &KeyTables) -> String {
        let names = |keys: &[KeyState]| {
            keys.iter()
                .map(|k| {
                    let sign = if k.down { "" } else { "-" };
                    format!("{sign}{}", tables.input_name(k.code))
                })
                .collect::<Vec<_>>()
                .join(" + ")
        };
        if self.release.is_empty() {
            names(&self.press)
        } else {
            format!("{} / {}", names(&self.press), names(&self.release))
        }
    }
}

/// Event sink plus the per-call "currently down" table.
struct ChordSender<F> {
    down: Vec<bool>,
    send: F,
}

impl<F: FnMut(u16, bool)> ChordSender<F> {
    fn is_down(&self, code: u16) -> bool {
        self.down.get(code as usize).copied().unwrap_or(false)
    }

    fn mark(&mut self, code: u16, down: bool) {
        if let Some(slot) = self.down.get_mut(code as usize) {
            *slot = down;
        }
    }

    fn send_key(&mut self, code: u16, down: bool) {
        debug!("sending KEY {} {}", if down { "DOWN" } else { "UP" }, code);
        (self.send)(code, down);
        self.mark(code, down);
    }

    fn send_keys(&mut self, keys: &[KeyState]) {
        for key in keys {
            if key.down && self.is_down(key.code) {
                self.send_key(key.code, false);
            }
            self.send_key(key.code, key.down);
        }
    }

    /// Send "up" for every entry of `keys` that is down, last entry first.
    fn release_keys(&mut self, keys: &[KeyState]) {
        for key in keys.iter().rev() {
            if self.is_down(key.code) {
                self.send_key(key.code, false);
            }
        }
    }
}

fn scan(tables: &KeyTables, chord: &str) -> Result<Vec<KeyState>, ActionError> {
    chord
        .split('+')
        .map(|name| {
            tables
                .input_key(name)
                .ok_or_else(|| ActionError::UnknownKey(name.to_string()))
        })
        .collect()
}
