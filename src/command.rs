//! Command language
//!
//! Every configuration change goes through one text line of the form
//! `verb args...`, whether it comes from the start-up file, a `load`ed file,
//! the control pipe or a `!command` action.
//!
//! ```text
//! bind <key|zone> <action>          profile <name>
//! stickmode <mode>                  stickzone <add|action|bounds|del> <zone> [...]
//! delete <profile|key|zone> <glob>  load <file>
//! dump <all|current|summary>        log_level <level>
//! out <text>  pos <row> <col>  font <name>  mod <leds>  textmode <n>
//! rgb <r> <g> <b>  refresh  clear
//! ```
//!
//! `#` starts a comment wherever a token would start.

use crate::action::{Action, COMMAND_PREFIX, PIPE_OUT_PREFIX};
use crate::device::{Device, DumpDetail};
use crate::error::CommandError;
use crate::glob;
use crate::io::DeviceIo;
use crate::stick::{Bounds, Coord, StickMode};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Split the next token off `line`.
///
/// Leading whitespace is skipped, the token runs up to the next space, tab
/// or `#`. One separator after the token is consumed; a token ended by `#`
/// or by the end of the line leaves nothing behind.
pub fn next_token(line: &str) -> (&str, &str) {
    let line = line.trim_start();
    let end = line.find([' ', '\t', '#']).unwrap_or(line.len());
    let rest = match line.as_bytes().get(end) {
        Some(b' ' | b'\t') => &line[end + 1..],
        _ => "",
    };
    (&line[..end], rest)
}

/// Handler for one verb, called with the text after the verb.
pub type CommandFn<IO> = fn(&mut Device<IO>, &str) -> Result<(), CommandError>;

/// Verb → handler table, filled once per device.
pub struct CommandTable<IO> {
    handlers: HashMap<&'static str, CommandFn<IO>>,
}

impl<IO: DeviceIo> CommandTable<IO> {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, CommandFn<IO>> = HashMap::new();
        handlers.insert("bind", bind);
        handlers.insert("profile", profile);
        handlers.insert("stickmode", stickmode);
        handlers.insert("stickzone", stickzone);
        handlers.insert("delete", delete);
        handlers.insert("load", load);
        handlers.insert("dump", dump);
        handlers.insert("out", out);
        handlers.insert("pos", pos);
        handlers.insert("font", font);
        handlers.insert("mod", mode_leds);
        handlers.insert("textmode", textmode);
        handlers.insert("rgb", rgb);
        handlers.insert("refresh", refresh);
        handlers.insert("clear", clear);
        handlers.insert("log_level", log_level);
        Self { handlers }
    }

    pub fn get(&self, verb: &str) -> Option<CommandFn<IO>> {
        self.handlers.get(verb).copied()
    }

    /// Registered verbs, sorted.
    pub fn verbs(&self) -> Vec<&'static str> {
        let mut verbs: Vec<_> = self.handlers.keys().copied().collect();
        verbs.sort_unstable();
        verbs
    }
}

impl<IO: DeviceIo> Default for CommandTable<IO> {
    fn default() -> Self {
        Self::new()
    }
}

impl<IO> fmt::Debug for CommandTable<IO> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("verbs", &self.handlers.len())
            .finish()
    }
}

/// `bind <target> <action>`
///
/// A `!` or `>` action keeps the rest of the line verbatim, a key action is
/// at most two whitespace separated chords.
fn bind<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (target, rest) = next_token(args);
    let raw = rest.trim_start();
    let (action, rest) = next_token(rest);
    let (action_up, _) = next_token(rest);

    let spec = if action.starts_with([COMMAND_PREFIX, PIPE_OUT_PREFIX]) {
        raw.to_string()
    } else if !action_up.is_empty() {
        format!("{action} {action_up}")
    } else {
        action.to_string()
    };
    device.bind(target, &spec)
}

fn profile<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (name, _) = next_token(args);
    device.switch_profile(name)
}

fn stickmode<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (name, _) = next_token(args);
    let mode: StickMode = name
        .parse()
        .map_err(|_| CommandError::UnknownStickMode(name.to_string()))?;
    device.stick_mut().set_mode(mode);
    Ok(())
}

const ZONE_OPERATIONS: [&str; 4] = ["add", "action", "bounds", "del"];

/// `stickzone <operation> <zone> [args]`, or `stickzone <zone> <operation> [args]`
fn stickzone<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (first, rest) = next_token(args);
    let (second, rest) = next_token(rest);
    let (operation, name) =
        if !ZONE_OPERATIONS.contains(&first) && ZONE_OPERATIONS.contains(&second) {
            (second, first)
        } else {
            (first, second)
        };

    if operation == "add" {
        if name.is_empty() {
            return Err(CommandError::MissingArgument("zone name"));
        }
        device.stick_mut().zone(name, true);
        return Ok(());
    }

    if operation == "del" {
        if !device.stick_mut().remove_zone(name) {
            return Err(CommandError::UnknownZone(name.to_string()));
        }
        return Ok(());
    }

    let tables = device.tables().clone();
    let zone = device
        .stick_mut()
        .zone(name, false)
        .ok_or_else(|| CommandError::UnknownZone(name.to_string()))?;
    match operation {
        "action" => {
            let action = Action::parse(&tables, rest.trim_start())?;
            zone.set_action(Some(Arc::new(action)));
        }
        "bounds" => zone.set_bounds(parse_bounds(rest)?),
        other => return Err(CommandError::UnknownZoneOperation(other.to_string())),
    }
    Ok(())
}

fn parse_bounds(args: &str) -> Result<Bounds<f64>, CommandError> {
    let bad = || CommandError::BadFormat {
        command: "bounds",
        args: args.trim().to_string(),
    };
    // only the first four values count, anything after them is ignored
    let values: Vec<f64> = args
        .split_whitespace()
        .take(4)
        .map(|v| v.parse().map_err(|_| bad()))
        .collect::<Result<_, _>>()?;
    match values[..] {
        [x1, y1, x2, y2] => Ok(Bounds::new(Coord::new(x1, y1), Coord::new(x2, y2))),
        _ => Err(bad()),
    }
}

/// `delete <profile|key|zone> <glob>`
fn delete<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (target, rest) = next_token(args);
    let (pattern, _) = next_token(rest);
    let re = glob::compile(pattern)?;

    let found = match target {
        "profile" => {
            let current = device.current_profile().name().to_string();
            let names = device.filtered_profile_names(&re);
            if names == [current.as_str()] {
                return Err(CommandError::CurrentProfile(current));
            }
            for name in &names {
                match device.remove_profile(name) {
                    Ok(()) => info!("profile {} deleted", name),
                    Err(e) => warn!("{}", e),
                }
            }
            !names.is_empty()
        }
        "key" => {
            let tables = device.tables().clone();
            let profile = device.current_profile_mut();
            let names = profile.filtered_key_names(&re, false);
            for name in &names {
                if let Some(slot) = profile.find_key_mut(&tables, name) {
                    slot.set_action(None);
                    info!("key {} unbound", name);
                }
            }
            !names.is_empty()
        }
        "zone" => {
            let names = device.stick().filtered_zone_names(&re);
            for name in &names {
                device.stick_mut().remove_zone(name);
                info!("stickzone {} unbound", name);
            }
            !names.is_empty()
        }
        other => return Err(CommandError::UnknownDeleteTarget(other.to_string())),
    };

    if found {
        Ok(())
    } else {
        Err(CommandError::NoMatch {
            target: target.to_string(),
            pattern: pattern.to_string(),
        })
    }
}

fn load<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (file, _) = next_token(args);
    if file.is_empty() {
        return Err(CommandError::MissingArgument("file name"));
    }
    let info = ">".repeat(device.loading_depth() + 1);
    device.load_file(Path::new(file), &info)
}

fn dump<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (target, _) = next_token(args);
    let detail = match target {
        "all" => DumpDetail::All,
        "current" => DumpDetail::Current,
        "summary" => DumpDetail::Summary,
        other => return Err(CommandError::UnknownDumpTarget(other.to_string())),
    };
    let text = device.dump(detail);
    device.io_mut().report(&text);
    Ok(())
}

fn out<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    device.io_mut().lcd_write(args);
    Ok(())
}

fn pos<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let [row, col] = parse_ints("pos", args)?;
    device.io_mut().lcd_position(row, col);
    Ok(())
}

fn font<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (name, _) = next_token(args);
    device.io_mut().lcd_font(name);
    Ok(())
}

fn mode_leds<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let [leds] = parse_ints("mod", args)?;
    device.io_mut().set_mode_leds(leds);
    Ok(())
}

fn textmode<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let [mode] = parse_ints("textmode", args)?;
    device.io_mut().lcd_text_mode(mode);
    Ok(())
}

fn rgb<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let [red, green, blue] = parse_ints("rgb", args)?;
    device.io_mut().set_key_color(red, green, blue);
    Ok(())
}

fn refresh<IO: DeviceIo>(device: &mut Device<IO>, _args: &str) -> Result<(), CommandError> {
    device.io_mut().lcd_refresh();
    Ok(())
}

fn clear<IO: DeviceIo>(device: &mut Device<IO>, _args: &str) -> Result<(), CommandError> {
    device.io_mut().lcd_clear();
    device.io_mut().lcd_refresh();
    Ok(())
}

fn log_level<IO: DeviceIo>(device: &mut Device<IO>, args: &str) -> Result<(), CommandError> {
    let (level, _) = next_token(args);
    device
        .io_mut()
        .set_log_level(level)
        .map_err(CommandError::Collaborator)
}

/// Exactly `N` whitespace separated integers.
fn parse_ints<const N: usize>(command: &'static str, args: &str) -> Result<[i32; N], CommandError> {
    let bad = || CommandError::BadFormat {
        command,
        args: args.trim().to_string(),
    };
    let mut fields = args.split_whitespace();
    let mut values = [0; N];
    for value in values.iter_mut() {
        *value = fields
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or_else(bad)?;
    }
    match fields.next() {
        Some(_) => Err(bad()),
        None => Ok(values),
    }
}
