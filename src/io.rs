//! Collaborator interface between the binding engine and the outside world
//!
//! The engine never touches uinput, FIFOs or the LCD directly. Everything it
//! produces goes through [`DeviceIo`]; the daemon plugs in
//! [`HardwareIo`](crate::hardware::HardwareIo), tests plug in a recorder.

use tracing::debug;

/// Absolute axis of the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StickAxis {
    X,
    Y,
}

/// Event for the virtual input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key { code: u16, down: bool },
    Abs { axis: StickAxis, value: i32 },
    /// End of one report's worth of events (SYN_REPORT).
    Sync,
}

impl InputEvent {
    pub fn key(code: u16, down: bool) -> Self {
        InputEvent::Key { code, down }
    }
}

/// Everything the engine needs from its surroundings.
///
/// Only event emission and the output channel are mandatory. Display, LED
/// and log-level requests default to a debug log line.
pub trait DeviceIo {
    /// Queue an event for the virtual input device.
    fn emit(&mut self, event: InputEvent);

    /// Write to the output channel. `text` already ends in a newline.
    fn write_output(&mut self, text: &str);

    /// Print the result of a `dump` command.
    fn report(&mut self, text: &str) {
        print!("{text}");
    }

    fn lcd_write(&mut self, text: &str) {
        debug!("LCD text ignored: {:?}", text);
    }

    fn lcd_position(&mut self, row: i32, col: i32) {
        debug!("LCD position ignored: {row},{col}");
    }

    fn lcd_text_mode(&mut self, mode: i32) {
        debug!("LCD text mode ignored: {mode}");
    }

    fn lcd_font(&mut self, name: &str) {
        debug!("LCD font ignored: {name}");
    }

    fn lcd_refresh(&mut self) {
        debug!("LCD refresh ignored");
    }

    fn lcd_clear(&mut self) {
        debug!("LCD clear ignored");
    }

    /// A full 160x48 monochrome frame received on the control pipe.
    fn lcd_image(&mut self, image: &[u8]) {
        debug!("LCD image ignored ({} bytes)", image.len());
    }

    fn set_mode_leds(&mut self, leds: i32) {
        debug!("mode LEDs ignored: {leds}");
    }

    fn set_key_color(&mut self, red: i32, green: i32, blue: i32) {
        debug!("key color ignored: {red} {green} {blue}");
    }

    /// Change the global log level. Returns an error message on failure.
    fn set_log_level(&mut self, level: &str) -> Result<(), String> {
        debug!("log level ignored: {level}");
        Ok(())
    }
}
