// Logitech G13 Linux Driver - Shared Library
// Key bindings, profiles, stick zones and the command language

pub mod action;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod glob;
pub mod hardware;
pub mod io;
pub mod keys;
pub mod logging;
pub mod pipe;
pub mod profile;
pub mod stick;

pub use action::{Action, KeyChord};
pub use command::{next_token, CommandTable};
pub use config::Settings;
pub use device::{Device, DumpDetail, DEFAULT_PROFILE};
pub use error::{ActionError, CommandError, HardwareError};
pub use frame::{Report, StickSample, REPORT_SIZE};
pub use hardware::{list_keypads, HardwareIo, Keypad, Session, VirtualKeypad};
pub use io::{DeviceIo, InputEvent, StickAxis};
pub use keys::{KeyIndex, KeyState, KeyTables, KEYPAD_KEY_COUNT};
pub use pipe::{Fifo, LineAssembler, PipeInput};
pub use profile::{BindingSlot, Profile};
pub use stick::{Bounds, Calibration, Coord, Recalibrate, Stick, StickMode, StickOutput, Zone};
