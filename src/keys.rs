//! Key name tables
//!
//! Two independent name spaces are involved in every binding:
//!
//! - **keypad keys** (`G1`, `M1`, `LEFT`, ...) whose position in the
//!   canonical order is their bit position in the hardware report, and
//! - **input keys** (`A`, `LEFTSHIFT`, `MLEFT`, ...), the Linux input event
//!   codes that actions send to the virtual device.
//!
//! Both are held by [`KeyTables`], built once at start-up and shared by
//! reference (`Arc<KeyTables>`) with every device.

use evdev::Key;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Number of keypad keys in the report bitmap.
pub const KEYPAD_KEY_COUNT: usize = 40;

/// Size of the Linux key code space (`KEY_CNT`).
pub const INPUT_KEY_COUNT: usize = 0x300;

/// Keypad key names in hardware order.
///
/// The position of each entry is its bit in the 40-bit key bitmap of the
/// report (byte 3 + index / 8, mask 1 << index % 8). Do NOT reorder.
const KEYPAD_KEY_NAMES: [&str; KEYPAD_KEY_COUNT] = [
    // byte 3
    "G1", "G2", "G3", "G4", "G5", "G6", "G7", "G8", //
    // byte 4
    "G9", "G10", "G11", "G12", "G13", "G14", "G15", "G16", //
    // byte 5
    "G17", "G18", "G19", "G20", "G21", "G22", "UNDEF1", "LIGHT_STATE", //
    // byte 6
    "BD", "L1", "L2", "L3", "L4", "M1", "M2", "M3", //
    // byte 7
    "MR", "LEFT", "DOWN", "TOP", "UNDEF3", "LIGHT", "LIGHT2", "MISC_TOGGLE",
];

/// Bits in the bitmap that are status flags rather than keys.
const NONPARSED_KEYS: &[&str] = &[
    "UNDEF1",
    "LIGHT_STATE",
    "UNDEF3",
    "LIGHT",
    "LIGHT2",
    "MISC_TOGGLE",
];

/// Mouse buttons, exposed with an `M` prefix so `MLEFT` does not clash
/// with the `LEFT` arrow key.
const MOUSE_BUTTONS: &[(&str, u16)] = &[
    ("MLEFT", 0x110),
    ("MRIGHT", 0x111),
    ("MMIDDLE", 0x112),
    ("MSIDE", 0x113),
    ("MEXTRA", 0x114),
];

/// Position of a keypad key in the report bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyIndex {
    pub index: usize,
    pub offset: usize,
    pub mask: u8,
}

impl KeyIndex {
    pub const fn new(index: usize) -> Self {
        Self {
            index,
            offset: index / 8,
            mask: 1 << (index % 8),
        }
    }
}

/// An input key code together with the direction to send it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub code: u16,
    pub down: bool,
}

impl KeyState {
    pub const fn new(code: u16, down: bool) -> Self {
        Self { code, down }
    }
}

/// Immutable name lookup tables for keypad and input keys.
pub struct KeyTables {
    keypad_index: HashMap<&'static str, usize>,
    input_by_name: HashMap<String, u16>,
    input_by_code: HashMap<u16, String>,
}

impl KeyTables {
    pub fn new() -> Self {
        let keypad_index = KEYPAD_KEY_NAMES
            .iter()
            .enumerate()
            .map(|(i, &name)| (name, i))
            .collect();

        // evdev prints the first `KEY_*`/`BTN_*` constant defined for a code
        let mut input_by_name = HashMap::new();
        let mut input_by_code = HashMap::new();
        for code in 0..INPUT_KEY_COUNT as u16 {
            let debug = format!("{:?}", Key::new(code));
            if let Some(name) = debug.strip_prefix("KEY_") {
                input_by_name.insert(name.to_string(), code);
                input_by_code.insert(code, name.to_string());
            }
        }
        for &(name, code) in MOUSE_BUTTONS {
            input_by_name.insert(name.to_string(), code);
            input_by_code.insert(code, name.to_string());
        }

        Self {
            keypad_index,
            input_by_name,
            input_by_code,
        }
    }

    /// Keypad key names in canonical (bit) order.
    pub fn keypad_names(&self) -> &'static [&'static str] {
        &KEYPAD_KEY_NAMES
    }

    /// Whether a keypad key is a real key (as opposed to a status bit).
    pub fn is_parsed(&self, name: &str) -> bool {
        !NONPARSED_KEYS.contains(&name)
    }

    /// Canonical index of a keypad key name.
    pub fn keypad_index(&self, name: &str) -> Option<usize> {
        self.keypad_index.get(name).copied()
    }

    /// Keypad key name for a canonical index.
    pub fn keypad_name(&self, index: usize) -> &'static str {
        KEYPAD_KEY_NAMES
            .get(index)
            .copied()
            .unwrap_or("(unknown G13 key)")
    }

    /// Resolve one chord entry.
    ///
    /// A leading `-` reverses the direction, then an optional `KEY_` prefix
    /// is stripped before the name is looked up.
    pub fn input_key(&self, name: &str) -> Option<KeyState> {
        let (name, down) = match name.strip_prefix('-') {
            Some(rest) => (rest, false),
            None => (name, true),
        };
        let name = name.strip_prefix("KEY_").unwrap_or(name);
        let code = match self.input_by_name.get(name) {
            Some(&code) => code,
            // aliases such as KEY_ROTATE_DISPLAY share a code with their canonical name
            None => Key::from_str(&format!("KEY_{name}"))
                .ok()
                .map(|key| key.code())
                .filter(|&code| (code as usize) < INPUT_KEY_COUNT)?,
        };
        Some(KeyState::new(code, down))
    }

    /// Every input code an action can send.
    pub fn input_codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.input_by_code.keys().copied()
    }

    /// Input key name for a code.
    pub fn input_name(&self, code: u16) -> &str {
        self.input_by_code
            .get(&code)
            .map(String::as_str)
            .unwrap_or("(unknown linux key)")
    }

    /// Human-readable listing of both tables.
    pub fn describe(&self) -> String {
        let mut input: Vec<&str> = self.input_by_name.keys().map(String::as_str).collect();
        input.sort_unstable();
        format!(
            "Known keys on G13:\n{}\nKnown keys to map to:\n{}",
            KEYPAD_KEY_NAMES.join(" "),
            input.join(" ")
        )
    }
}

impl Default for KeyTables {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTables")
            .field("keypad_keys", &self.keypad_index.len())
            .field("input_keys", &self.input_by_name.len())
            .finish()
    }
}
