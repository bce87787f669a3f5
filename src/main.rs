//! G13 userspace driver daemon
//!
//! Opens every attached G13, creates its virtual input device and control
//! pipes, runs the start-up command file and then polls keypads and pipes
//! until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use hidapi::HidApi;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use g13d::config::Settings;
use g13d::hardware::{list_keypads, Keypad, Session};
use g13d::keys::KeyTables;
use g13d::logging::{self, LogHandle};

#[derive(Parser)]
#[command(name = "g13d")]
#[command(about = "Userspace driver for the Logitech G13 gameboard")]
struct Cli {
    /// Command file to run for every keypad at start-up
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings file path (default: ~/.config/g13/g13d.toml)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Directory for the g13-N control pipes
    #[arg(long, alias = "pipe_dir")]
    pipe_dir: Option<PathBuf>,

    /// Octal umask applied to the control pipes
    #[arg(long)]
    umask: Option<String>,

    /// Log level (trace, debug, info, notice, warn, error, crit)
    #[arg(long, alias = "log_level")]
    log_level: Option<String>,

    /// Print the known key names and exit
    #[arg(long)]
    list_keys: bool,
}

/// Delay between scans while no keypad is attached.
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let cli = Cli::parse();
    let tables = Arc::new(KeyTables::new());

    if cli.list_keys {
        println!("{}", tables.describe());
        return Ok(());
    }

    let settings_path = cli.settings.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path)
        .with_context(|| format!("loading {}", settings_path.display()))?;
    if let Some(config) = cli.config {
        settings.config = Some(config);
    }
    if let Some(pipe_dir) = cli.pipe_dir {
        settings.pipe_dir = pipe_dir;
    }
    if let Some(umask) = cli.umask {
        settings.umask = umask;
    }
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    let log = logging::init(&settings.log_level)?;
    info!("Settings from {:?}", settings_path);
    let umask = settings.umask_bits()?;

    std::fs::create_dir_all(&settings.pipe_dir)
        .with_context(|| format!("creating {}", settings.pipe_dir.display()))?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("installing signal handler")?;

    let mut api = HidApi::new()?;
    let mut sessions: Vec<Session> = Vec::new();
    let mut next_index = 0;

    info!("Entering main loop. Press Ctrl+C to exit.");
    while running.load(Ordering::SeqCst) {
        if sessions.is_empty() {
            if let Err(e) = api.refresh_devices() {
                warn!("HID rescan failed: {}", e);
            }
            for info in list_keypads(&api) {
                match open_session(&api, &info, next_index, &tables, &settings, umask, &log) {
                    Ok(session) => {
                        sessions.push(session);
                        next_index += 1;
                    }
                    Err(e) => error!("Failed to set up keypad: {:#}", e),
                }
            }
            if sessions.is_empty() {
                std::thread::sleep(RESCAN_INTERVAL);
                continue;
            }
        }

        sessions.retain_mut(|session| match session.tick() {
            Ok(()) => true,
            Err(e) => {
                error!("G13 #{}: {}", session.device().index(), e);
                false
            }
        });
    }

    info!("Shutting down");
    Ok(())
}

fn open_session(
    api: &HidApi,
    info: &hidapi::DeviceInfo,
    index: usize,
    tables: &Arc<KeyTables>,
    settings: &Settings,
    umask: u32,
    log: &LogHandle,
) -> Result<Session> {
    let keypad = Keypad::open(api, info)?;
    let mut session = Session::open(
        keypad,
        index,
        Arc::clone(tables),
        &settings.pipe_dir,
        umask,
        Some(log.clone()),
    )?;
    if let Some(config) = &settings.config {
        if let Err(e) = session.device_mut().read_config_file(config) {
            error!("{}", e);
        }
    }
    Ok(session)
}
