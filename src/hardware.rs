//! Keypad hardware, virtual input device and per-keypad session
//!
//! The keypad is read through hidapi: 8-byte interrupt reports, and HID
//! feature reports for the mode LEDs and the backlight. Synthesized events
//! go to a uinput device created with evdev, one batch per report.

use crate::device::Device;
use crate::error::HardwareError;
use crate::frame::{Report, REPORT_SIZE};
use crate::io::{DeviceIo, InputEvent, StickAxis};
use crate::keys::KeyTables;
use crate::logging::LogHandle;
use crate::pipe::{pipe_paths, Fifo, LineAssembler, MAX_PENDING};
use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputId, Key, UinputAbsSetup,
};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Logitech vendor ID
pub const G13_VENDOR_ID: u16 = 0x046d;

/// G13 product ID
pub const G13_PRODUCT_ID: u16 = 0xc21c;

/// How long one tick waits for a report (ms).
pub const READ_TIMEOUT_MS: i32 = 100;

const MODE_LEDS_REPORT_ID: u8 = 5;
const KEY_COLOR_REPORT_ID: u8 = 7;

/// Name of the virtual input device
pub const VIRTUAL_DEVICE_NAME: &str = "G13";

/// All attached keypads.
pub fn list_keypads(api: &HidApi) -> Vec<DeviceInfo> {
    let keypads: Vec<DeviceInfo> = api
        .device_list()
        .filter(|d| d.vendor_id() == G13_VENDOR_ID && d.product_id() == G13_PRODUCT_ID)
        .cloned()
        .collect();
    info!("Found {} G13 keypads", keypads.len());
    keypads
}

/// An opened keypad.
pub struct Keypad {
    device: HidDevice,
    path: String,
}

impl Keypad {
    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self, HardwareError> {
        let path = info.path().to_string_lossy().to_string();
        let device = info.open_device(api)?;
        debug!("Opened keypad at {}", path);
        Ok(Self { device, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait up to `timeout_ms` for one key state report.
    ///
    /// Timeouts and reads of the wrong size yield `None`.
    pub fn read_report(&self, timeout_ms: i32) -> Result<Option<Report>, HardwareError> {
        let mut buf = [0u8; REPORT_SIZE + 1];
        let n = self.device.read_timeout(&mut buf, timeout_ms)?;
        if n == 0 {
            return Ok(None);
        }
        let report = Report::from_bytes(&buf[..n]);
        if report.is_none() {
            debug!("ignoring {} byte report", n);
        }
        Ok(report)
    }

    pub fn set_mode_leds(&self, leds: u8) -> Result<(), HardwareError> {
        self.device
            .send_feature_report(&[MODE_LEDS_REPORT_ID, leds, 0, 0, 0])?;
        Ok(())
    }

    pub fn set_key_color(&self, red: u8, green: u8, blue: u8) -> Result<(), HardwareError> {
        self.device
            .send_feature_report(&[KEY_COLOR_REPORT_ID, red, green, blue, 0])?;
        Ok(())
    }
}

/// The uinput device receiving synthesized events.
pub struct VirtualKeypad {
    device: VirtualDevice,
    pending: Vec<evdev::InputEvent>,
}

impl VirtualKeypad {
    /// Registers every code `tables` can resolve a name to.
    pub fn new(tables: &KeyTables) -> Result<Self, HardwareError> {
        let mut keys = AttributeSet::<Key>::new();
        for code in tables.input_codes() {
            keys.insert(Key::new(code));
        }
        keys.insert(Key::BTN_THUMB);

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(HardwareError::CreateDevice)?
            .name(VIRTUAL_DEVICE_NAME)
            .input_id(InputId::new(
                BusType::BUS_USB,
                G13_VENDOR_ID,
                G13_PRODUCT_ID,
                1,
            ))
            .with_keys(&keys)
            .map_err(HardwareError::CreateDevice)?;

        for axis in [AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y] {
            let setup = UinputAbsSetup::new(axis, AbsInfo::new(127, 0, 255, 0, 0, 1));
            builder = builder
                .with_absolute_axis(&setup)
                .map_err(HardwareError::CreateDevice)?;
        }

        let device = builder.build().map_err(HardwareError::CreateDevice)?;
        Ok(Self {
            device,
            pending: Vec::new(),
        })
    }

    /// Queue an event; [`InputEvent::Sync`] flushes the batch.
    pub fn send(&mut self, event: InputEvent) -> Result<(), HardwareError> {
        match event {
            InputEvent::Key { code, down } => self.pending.push(evdev::InputEvent::new(
                EventType::KEY,
                code,
                down as i32,
            )),
            InputEvent::Abs { axis, value } => {
                let code = match axis {
                    StickAxis::X => AbsoluteAxisType::ABS_X,
                    StickAxis::Y => AbsoluteAxisType::ABS_Y,
                };
                self.pending
                    .push(evdev::InputEvent::new(EventType::ABSOLUTE, code.0, value));
            }
            InputEvent::Sync => {
                // emit() terminates the batch with SYN_REPORT
                if !self.pending.is_empty() {
                    let result = self.device.emit(&self.pending);
                    self.pending.clear();
                    result.map_err(HardwareError::EmitEvent)?;
                }
            }
        }
        Ok(())
    }
}

/// [`DeviceIo`] backed by the real keypad.
pub struct HardwareIo {
    keypad: Keypad,
    virtual_keypad: VirtualKeypad,
    output: Option<Fifo>,
    log: Option<LogHandle>,
}

impl HardwareIo {
    pub fn new(keypad: Keypad, virtual_keypad: VirtualKeypad) -> Self {
        Self {
            keypad,
            virtual_keypad,
            output: None,
            log: None,
        }
    }

    pub fn with_output(mut self, output: Option<Fifo>) -> Self {
        self.output = output;
        self
    }

    pub fn with_log_handle(mut self, log: Option<LogHandle>) -> Self {
        self.log = log;
        self
    }

    pub fn keypad(&self) -> &Keypad {
        &self.keypad
    }
}

impl DeviceIo for HardwareIo {
    fn emit(&mut self, event: InputEvent) {
        if let Err(e) = self.virtual_keypad.send(event) {
            error!("{}", e);
        }
    }

    fn write_output(&mut self, text: &str) {
        match &mut self.output {
            Some(pipe) => {
                if let Err(e) = pipe.write_text(text) {
                    warn!("writing {}: {}", pipe.path().display(), e);
                }
            }
            None => debug!("no output pipe, dropping {:?}", text),
        }
    }

    fn set_mode_leds(&mut self, leds: i32) {
        if let Err(e) = self.keypad.set_mode_leds(leds as u8) {
            error!("error setting mode LEDs: {}", e);
        }
    }

    fn set_key_color(&mut self, red: i32, green: i32, blue: i32) {
        if let Err(e) = self
            .keypad
            .set_key_color(red as u8, green as u8, blue as u8)
        {
            error!("error setting key color: {}", e);
        }
    }

    fn set_log_level(&mut self, level: &str) -> Result<(), String> {
        match &self.log {
            Some(handle) => handle.set_level(level),
            None => Err("log level cannot be changed".to_string()),
        }
    }
}

/// One attached keypad: its engine and its input pipe.
pub struct Session {
    device: Device<HardwareIo>,
    input: Option<Fifo>,
    assembler: LineAssembler,
    buf: Vec<u8>,
}

impl Session {
    /// Set up the virtual device and the control pipes for `keypad`.
    ///
    /// A pipe that cannot be created is logged and left out.
    pub fn open(
        keypad: Keypad,
        index: usize,
        tables: Arc<KeyTables>,
        pipe_dir: &Path,
        umask: u32,
        log: Option<LogHandle>,
    ) -> Result<Self, HardwareError> {
        let virtual_keypad = VirtualKeypad::new(&tables)?;

        let (input_path, output_path) = pipe_paths(pipe_dir, index);
        let open_pipe = |path: &Path| match Fifo::create(path, umask) {
            Ok(fifo) => Some(fifo),
            Err(e) => {
                error!("{}", e);
                None
            }
        };
        let input = open_pipe(&input_path);
        let output = open_pipe(&output_path);

        let io = HardwareIo::new(keypad, virtual_keypad)
            .with_output(output)
            .with_log_handle(log);
        let mut device = Device::new(index, tables, io);
        device.set_pipe_names(input_path, output_path);

        device.io_mut().set_mode_leds(0);
        device.io_mut().set_key_color(0, 0, 255);

        info!("G13 #{} ready at {}", index, device.io().keypad().path());
        Ok(Self {
            device,
            input,
            assembler: LineAssembler::new(),
            buf: vec![0; MAX_PENDING],
        })
    }

    pub fn device(&self) -> &Device<HardwareIo> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<HardwareIo> {
        &mut self.device
    }

    /// Process at most one report, then whatever is waiting on the pipe.
    pub fn tick(&mut self) -> Result<(), HardwareError> {
        if let Some(report) = self.device.io().keypad().read_report(READ_TIMEOUT_MS)? {
            self.device.process_report(&report);
        }
        self.poll_pipe();
        Ok(())
    }

    fn poll_pipe(&mut self) {
        let Some(pipe) = self.input.as_mut() else {
            return;
        };
        match pipe.read_available(&mut self.buf) {
            Ok(0) => {}
            Ok(n) => {
                debug!("read {} characters", n);
                let input = self.assembler.push(&self.buf[..n]);
                self.device.process_pipe_input(input);
            }
            Err(e) => warn!("reading {}: {}", pipe.path().display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // needs write access to /dev/uinput
    fn test_virtual_keypad_batches_until_sync() {
        let mut vk = VirtualKeypad::new(&KeyTables::new()).unwrap();
        vk.send(InputEvent::key(30, true)).unwrap();
        vk.send(InputEvent::key(30, false)).unwrap();
        assert_eq!(vk.pending.len(), 2);
        vk.send(InputEvent::Sync).unwrap();
        assert!(vk.pending.is_empty());
    }

    #[test]
    #[ignore] // needs an attached keypad
    fn test_open_first_keypad() {
        let api = HidApi::new().unwrap();
        let keypads = list_keypads(&api);
        let keypad = Keypad::open(&api, &keypads[0]).unwrap();
        keypad.set_key_color(0, 0, 255).unwrap();
    }
}
