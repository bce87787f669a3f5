//! Error types for the binding engine and the hardware layer

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while constructing an [`Action`](crate::action::Action)
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("empty action string")]
    Empty,

    #[error("create action unknown key : {0}")]
    UnknownKey(String),
}

/// Errors from a single command line
///
/// None of these are fatal: the interpreter reports them and moves on to the
/// next line.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command : {0}")]
    UnknownCommand(String),

    #[error("bind key {0} unknown")]
    UnknownTarget(String),

    #[error("bind {target} {action} failed : {source}")]
    Bind {
        target: String,
        action: String,
        #[source]
        source: ActionError,
    },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("bad {command} format: <{args}>")]
    BadFormat { command: &'static str, args: String },

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("unknown stick mode : <{0}>")]
    UnknownStickMode(String),

    #[error("unknown stick zone : <{0}>")]
    UnknownZone(String),

    #[error("unknown stickzone operation: <{0}>")]
    UnknownZoneOperation(String),

    #[error("unknown dump target: <{0}>")]
    UnknownDumpTarget(String),

    #[error("unknown delete target: <{0}>")]
    UnknownDeleteTarget(String),

    #[error("no {target} name matches <{pattern}>")]
    NoMatch { target: String, pattern: String },

    #[error("profile {0} is the current profile and cannot be deleted")]
    CurrentProfile(String),

    #[error("invalid pattern <{pattern}>: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{} loading recursion", .0.display())]
    LoadRecursion(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Collaborator(String),
}

/// Errors from the USB keypad, the virtual input device and the control pipes
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Failed to create virtual device: {0}")]
    CreateDevice(#[source] std::io::Error),

    #[error("Failed to emit event: {0}")]
    EmitEvent(#[source] std::io::Error),

    #[error("Failed to create pipe {}: {source}", path.display())]
    Pipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Device disconnected")]
    Disconnected,
}
