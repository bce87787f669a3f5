//! Logging set-up
//!
//! `RUST_LOG` wins at start-up; otherwise the configured level is used. The
//! filter sits behind a reload layer so `log_level` can change it later.

use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

/// Handle for changing the log level of a running daemon.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    pub fn set_level(&self, name: &str) -> Result<(), String> {
        let level = parse_level(name).ok_or_else(|| format!("unknown log level <{name}>"))?;
        self.handle
            .reload(EnvFilter::new(level.to_string()))
            .map_err(|e| e.to_string())?;
        info!("log level set to {}", level);
        Ok(())
    }
}

/// Parse a log level name, syslog names included.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" | "notice" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" | "crit" | "alert" | "fatal" | "emerg" => Some(LevelFilter::ERROR),
        _ => None,
    }
}

/// Install the global subscriber.
pub fn init(level: &str) -> anyhow::Result<LogHandle> {
    let default = parse_level(level).unwrap_or(LevelFilter::INFO);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default.to_string()));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()?;

    if parse_level(level).is_none() {
        tracing::warn!("unknown log level <{}>, using {}", level, default);
    }
    Ok(LogHandle { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_level("WARNING"), Some(LevelFilter::WARN));
        assert_eq!(parse_level("Notice"), Some(LevelFilter::INFO));
        assert_eq!(parse_level("crit"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("emerg"), Some(LevelFilter::ERROR));
        assert_eq!(parse_level("verbose"), None);
        assert_eq!(parse_level(""), None);
    }
}
