//! Control pipes
//!
//! Every keypad gets a pair of FIFOs: `g13-N` accepts command lines (or a
//! raw LCD image) and `g13-N_out` receives the text of `>` actions. Both are
//! opened read-write and non-blocking so the run loop never waits on a
//! missing peer.

use crate::error::HardwareError;
use std::ffi::CString;
use std::fs::{File, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Size of a raw 160x48 monochrome LCD frame.
pub const LCD_IMAGE_SIZE: usize = 960;

/// Unterminated input longer than this is discarded.
pub const MAX_PENDING: usize = 1024 * 1024;

/// Input and output FIFO paths for keypad `index`.
pub fn pipe_paths(dir: &Path, index: usize) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("g13-{index}")),
        dir.join(format!("g13-{index}_out")),
    )
}

/// One burst of data from the input pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeInput {
    Image(Vec<u8>),
    Lines(Vec<String>),
}

/// Splits pipe data into command lines, keeping partial lines between reads.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes waiting for their line terminator.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn push(&mut self, data: &[u8]) -> PipeInput {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data);

        if buf.len() == LCD_IMAGE_SIZE {
            return PipeInput::Image(buf);
        }

        let mut lines = Vec::new();
        let mut start = 0;
        for (i, &byte) in buf.iter().enumerate() {
            if byte == b'\r' || byte == b'\n' {
                if i != start {
                    lines.push(String::from_utf8_lossy(&buf[start..i]).into_owned());
                }
                start = i + 1;
            }
        }

        let tail = &buf[start..];
        if tail.len() < MAX_PENDING {
            self.pending = tail.to_vec();
        } else {
            warn!("dropping {} bytes of unterminated pipe input", tail.len());
        }
        PipeInput::Lines(lines)
    }
}

/// A FIFO owned by the daemon, removed again on drop.
#[derive(Debug)]
pub struct Fifo {
    path: PathBuf,
    file: File,
}

impl Fifo {
    /// Create (or re-create) the FIFO at `path` with mode `0777 & !umask`.
    pub fn create(path: &Path, umask: u32) -> Result<Self, HardwareError> {
        let pipe_error = |source: io::Error| HardwareError::Pipe {
            path: path.to_path_buf(),
            source,
        };

        match std::fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(pipe_error(e)),
            _ => {}
        }

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| pipe_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let mode = 0o777 & !umask;
        // SAFETY: c_path is a valid NUL-terminated string
        if unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) } != 0 {
            return Err(pipe_error(io::Error::last_os_error()));
        }
        // mkfifo is subject to the process umask, set the mode explicitly
        std::fs::set_permissions(path, Permissions::from_mode(mode)).map_err(pipe_error)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(pipe_error)?;

        debug!("created pipe {} (mode {:o})", path.display(), mode);
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read whatever is available; `Ok(0)` when the pipe is empty.
    pub fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            other => other,
        }
    }

    pub fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes())
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("removing {}: {}", self.path.display(), e);
        }
    }
}
