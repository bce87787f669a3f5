//! Per-keypad binding engine
//!
//! [`Device`] owns everything that belongs to one attached keypad: the
//! profiles and the current one, the last seen state of every key, the
//! stick, and the command table. Hardware reports and command lines both
//! enter here and are processed on the caller's thread, one at a time.

use crate::action::Action;
use crate::command::{next_token, CommandTable};
use crate::error::CommandError;
use crate::frame::{Report, StickSample};
use crate::io::{DeviceIo, InputEvent, StickAxis};
use crate::keys::{KeyTables, KEYPAD_KEY_COUNT};
use crate::pipe::PipeInput;
use crate::profile::Profile;
use crate::stick::{Stick, StickOutput};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Name of the profile every device starts with.
pub const DEFAULT_PROFILE: &str = "default";

/// How much `dump` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpDetail {
    /// Device index, pipe names and current profile.
    Summary,
    /// Summary plus the stick zones and the current profile.
    Current,
    /// Summary plus the stick zones and every profile.
    All,
}

pub struct Device<IO> {
    index: usize,
    tables: Arc<KeyTables>,
    io: IO,
    profiles: BTreeMap<String, Profile>,
    current: String,
    key_states: [bool; KEYPAD_KEY_COUNT],
    stick: Stick,
    commands: CommandTable<IO>,
    loading: Vec<PathBuf>,
    pipe_names: Option<(PathBuf, PathBuf)>,
}

impl<IO: DeviceIo> Device<IO> {
    pub fn new(index: usize, tables: Arc<KeyTables>, io: IO) -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            DEFAULT_PROFILE.to_string(),
            Profile::new(DEFAULT_PROFILE, &tables),
        );
        let stick = Stick::new(&tables);
        Self {
            index,
            tables,
            io,
            profiles,
            current: DEFAULT_PROFILE.to_string(),
            key_states: [false; KEYPAD_KEY_COUNT],
            stick,
            commands: CommandTable::new(),
            loading: Vec::new(),
            pipe_names: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tables(&self) -> &Arc<KeyTables> {
        &self.tables
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn stick(&self) -> &Stick {
        &self.stick
    }

    pub fn stick_mut(&mut self) -> &mut Stick {
        &mut self.stick
    }

    /// Record the control pipe paths shown by `dump`.
    pub fn set_pipe_names(&mut self, input: PathBuf, output: PathBuf) {
        self.pipe_names = Some((input, output));
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub fn current_profile(&self) -> &Profile {
        // `current` always names an entry of `profiles`
        &self.profiles[&self.current]
    }

    pub fn current_profile_mut(&mut self) -> &mut Profile {
        self.profiles
            .entry(self.current.clone())
            .or_insert_with_key(|name| Profile::new(name.as_str(), &self.tables))
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Make `name` the current profile, forking the current one if needed.
    pub fn switch_profile(&mut self, name: &str) -> Result<(), CommandError> {
        if name.is_empty() {
            return Err(CommandError::MissingArgument("profile name"));
        }
        if !self.profiles.contains_key(name) {
            let fork = self.current_profile().fork(name);
            self.profiles.insert(name.to_string(), fork);
            debug!("profile {} forked from {}", name, self.current);
        }
        self.current = name.to_string();
        Ok(())
    }

    pub fn filtered_profile_names(&self, pattern: &Regex) -> Vec<String> {
        self.profiles
            .keys()
            .filter(|name| pattern.is_match(name))
            .cloned()
            .collect()
    }

    /// Drop a profile other than the current one.
    pub fn remove_profile(&mut self, name: &str) -> Result<(), CommandError> {
        if name == self.current {
            return Err(CommandError::CurrentProfile(name.to_string()));
        }
        self.profiles.remove(name);
        Ok(())
    }

    /// Bind `spec` to the key `target` of the current profile, or else to
    /// the stick zone `target`.
    pub fn bind(&mut self, target: &str, spec: &str) -> Result<(), CommandError> {
        let is_key = self.tables.keypad_index(target).is_some();
        if !is_key && self.stick.zone(target, false).is_none() {
            return Err(CommandError::UnknownTarget(target.to_string()));
        }

        let action = Action::parse(&self.tables, spec)
            .map(Arc::new)
            .map_err(|source| CommandError::Bind {
                target: target.to_string(),
                action: spec.to_string(),
                source,
            })?;

        let tables = self.tables.clone();
        if is_key {
            if let Some(slot) = self.current_profile_mut().find_key_mut(&tables, target) {
                slot.set_action(Some(action));
            }
        } else if let Some(zone) = self.stick.zone(target, false) {
            zone.set_action(Some(action));
        }
        debug!("bind {} [{}]", target, spec);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Store the new state of key `index`; returns whether it changed.
    pub fn update_key_state(&mut self, index: usize, pressed: bool) -> bool {
        match self.key_states.get_mut(index) {
            Some(state) if *state != pressed => {
                *state = pressed;
                true
            }
            _ => false,
        }
    }

    pub fn is_key_pressed(&self, index: usize) -> bool {
        self.key_states.get(index).copied().unwrap_or(false)
    }

    /// Process one hardware report: stick, then keys, then a sync.
    pub fn process_report(&mut self, report: &Report) {
        self.process_stick(report.stick());

        // a `!profile` action switches profiles mid-report; the rest of this
        // report is still decoded with the bindings it started with
        let slots: Vec<_> = self
            .current_profile()
            .slots()
            .iter()
            .filter(|slot| slot.is_parsed())
            .map(|slot| (slot.key(), slot.action().cloned()))
            .collect();

        for (key, action) in slots {
            let pressed = report.is_pressed(key);
            if self.update_key_state(key.index, pressed) {
                if let Some(action) = action {
                    self.trigger(&action, pressed);
                }
            }
        }

        self.io.emit(InputEvent::Sync);
    }

    fn process_stick(&mut self, sample: StickSample) {
        match self.stick.update(sample) {
            StickOutput::Calibrating => {}
            StickOutput::Absolute(pos) => {
                self.io.emit(InputEvent::Abs {
                    axis: StickAxis::X,
                    value: pos.x,
                });
                self.io.emit(InputEvent::Abs {
                    axis: StickAxis::Y,
                    value: pos.y,
                });
            }
            StickOutput::Zones(hits) => {
                for (action, pressed) in hits {
                    self.trigger(&action, pressed);
                }
            }
        }
    }

    /// Run `action` for a press (`true`) or release (`false`).
    pub fn trigger(&mut self, action: &Action, pressed: bool) {
        match action {
            Action::Keys(chord) => {
                let io = &mut self.io;
                chord.act(pressed, |code, down| io.emit(InputEvent::key(code, down)));
            }
            Action::Command(command) => {
                if pressed {
                    self.command(command, None);
                }
            }
            Action::PipeOut(text) => {
                if pressed {
                    self.io.write_output(text);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Run one command line, logging any failure.
    ///
    /// With `info` set the line is echoed first, prefixed by `info`.
    pub fn command(&mut self, line: &str, info: Option<&str>) {
        let (verb, _) = next_token(line);
        if verb.is_empty() {
            return;
        }
        if let Some(info) = info {
            info!("{}: {}", info, line.trim_start());
        }
        match self.execute(line) {
            Ok(()) => {}
            Err(e @ CommandError::NoMatch { .. }) => info!("{}", e),
            Err(e) => error!("{}", e),
        }
    }

    /// Run one command line.
    pub fn execute(&mut self, line: &str) -> Result<(), CommandError> {
        let (verb, args) = next_token(line);
        if verb.is_empty() {
            return Ok(());
        }
        let handler = self
            .commands
            .get(verb)
            .ok_or_else(|| CommandError::UnknownCommand(verb.to_string()))?;
        handler(self, args)
    }

    /// Number of files currently being loaded.
    pub fn loading_depth(&self) -> usize {
        self.loading.len()
    }

    /// Run every line of a command file.
    ///
    /// A relative path is taken relative to the file that is loading it.
    /// Loading a file that is already being loaded is refused.
    pub fn load_file(&mut self, path: &Path, info: &str) -> Result<(), CommandError> {
        let path = match self.loading.last().and_then(|file| file.parent()) {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        let path = normalize_path(&path);

        if self.loading.contains(&path) {
            return Err(CommandError::LoadRecursion(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|source| CommandError::Io {
            path: path.clone(),
            source,
        })?;

        self.loading.push(path);
        for line in content.lines() {
            self.command(line.trim_end_matches('\r'), Some(info));
        }
        self.loading.pop();
        Ok(())
    }

    /// Run the start-up command file.
    pub fn read_config_file(&mut self, path: &Path) -> Result<(), CommandError> {
        info!("reading configuration from {}", path.display());
        self.load_file(path, "  cfg")
    }

    /// Handle one burst of control pipe data.
    pub fn process_pipe_input(&mut self, input: PipeInput) {
        match input {
            PipeInput::Image(image) => self.io.lcd_image(&image),
            PipeInput::Lines(lines) => {
                for line in lines {
                    self.command(&line, Some("command"));
                }
            }
        }
    }

    /// Describe the device state.
    pub fn dump(&self, detail: DumpDetail) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "G13 id={}", self.index);
        if let Some((input, output)) = &self.pipe_names {
            let _ = writeln!(out, "   input_pipe_name={:?}", input.display().to_string());
            let _ = writeln!(out, "   output_pipe_name={:?}", output.display().to_string());
        }
        let _ = writeln!(out, "   current_profile={}", self.current);

        match detail {
            DumpDetail::Summary => {}
            DumpDetail::Current => {
                self.stick.dump(&self.tables, &mut out);
                self.current_profile().dump(&self.tables, &mut out);
            }
            DumpDetail::All => {
                self.stick.dump(&self.tables, &mut out);
                for profile in self.profiles.values() {
                    profile.dump(&self.tables, &mut out);
                }
            }
        }
        out
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = out.components().next_back();
                let (named, root) = (
                    matches!(last, Some(Component::Normal(_))),
                    matches!(last, Some(Component::RootDir)),
                );
                if named {
                    out.pop();
                } else if !root {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Events(Vec<InputEvent>);

    impl DeviceIo for Events {
        fn emit(&mut self, event: InputEvent) {
            self.0.push(event);
        }

        fn write_output(&mut self, _text: &str) {}
    }

    fn device() -> Device<Events> {
        Device::new(0, Arc::new(KeyTables::new()), Events::default())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), Path::new("/a/c"));
        assert_eq!(normalize_path(Path::new("/../x")), Path::new("/x"));
        assert_eq!(normalize_path(Path::new("a/../../b")), Path::new("../b"));
        assert_eq!(normalize_path(Path::new("./")), Path::new("."));
    }

    #[test]
    fn test_load_file_refuses_file_being_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("g13.cfg");
        std::fs::write(&file, "bind G1 KEY_A\n").unwrap();

        let mut d = device();
        d.loading.push(normalize_path(&file));
        let result = d.load_file(Path::new("g13.cfg"), "test");
        match result {
            Err(CommandError::LoadRecursion(path)) => assert_eq!(path, normalize_path(&file)),
            other => panic!("expected LoadRecursion, got {:?}", other),
        }
        assert_eq!(d.loading_depth(), 1);
        assert!(d.current_profile().find_key(d.tables(), "G1").unwrap().action().is_none());
    }

    #[test]
    fn test_starts_with_default_profile() {
        let d = device();
        assert_eq!(d.current_profile().name(), DEFAULT_PROFILE);
        assert_eq!(d.profile_names().collect::<Vec<_>>(), [DEFAULT_PROFILE]);
    }

    #[test]
    fn test_update_key_state_reports_changes() {
        let mut d = device();
        assert!(!d.update_key_state(3, false));
        assert!(d.update_key_state(3, true));
        assert!(!d.update_key_state(3, true));
        assert!(d.is_key_pressed(3));
        assert!(d.update_key_state(3, false));
        assert!(!d.update_key_state(KEYPAD_KEY_COUNT, true));
    }

    #[test]
    fn test_remove_current_profile_refused() {
        let mut d = device();
        assert!(matches!(
            d.remove_profile(DEFAULT_PROFILE),
            Err(CommandError::CurrentProfile(_))
        ));
        d.switch_profile("other").unwrap();
        d.remove_profile(DEFAULT_PROFILE).unwrap();
        assert!(d.profile(DEFAULT_PROFILE).is_none());
        assert_eq!(d.current_profile().name(), "other");
    }

    #[test]
    fn test_switch_profile_requires_name() {
        let mut d = device();
        assert!(matches!(
            d.switch_profile(""),
            Err(CommandError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_bind_unknown_target() {
        let mut d = device();
        assert!(matches!(
            d.bind("G99", "A"),
            Err(CommandError::UnknownTarget(_))
        ));
        assert!(matches!(
            d.bind("G1", "NOPE"),
            Err(CommandError::Bind { .. })
        ));
        assert!(d.current_profile().slots()[0].action().is_none());
    }

    #[test]
    fn test_absolute_stick_emits_raw_axes() {
        let mut d = device();
        d.execute("stickmode ABSOLUTE").unwrap();
        d.process_report(&Report::new([0, 40, 200, 0, 0, 0, 0, 0]));
        assert_eq!(
            d.io().0,
            [
                InputEvent::Abs { axis: StickAxis::X, value: 40 },
                InputEvent::Abs { axis: StickAxis::Y, value: 200 },
                InputEvent::Sync,
            ]
        );
    }

    #[test]
    fn test_status_bits_never_fire() {
        let mut d = device();
        d.execute("bind LIGHT A").unwrap();
        // LIGHT is key 37: byte 7, mask 0x20; stick centered
        d.process_report(&Report::new([0, 127, 127, 0, 0, 0, 0, 0x20]));
        assert_eq!(d.io().0, [InputEvent::Sync]);
        assert!(!d.is_key_pressed(37));
    }
}
