//! Daemon settings
//!
//! Read from TOML (default `~/.config/g13/g13d.toml`); command line flags
//! override individual values. Bindings are not stored here: they live in
//! the command file named by `config`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the `g13-N` control pipes
    pub pipe_dir: PathBuf,
    /// Octal mask removed from the pipes' `0777` mode
    pub umask: String,
    /// Command file run for every keypad at start-up
    pub config: Option<PathBuf>,
    /// Initial log level
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipe_dir: PathBuf::from("/run/g13"),
            umask: "0".to_string(),
            config: None,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Get the default settings file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("g13")
            .join("g13d.toml")
    }

    /// Load settings from a file, or return defaults if it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// The umask as a number.
    pub fn umask_bits(&self) -> anyhow::Result<u32> {
        let digits = self.umask.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        u32::from_str_radix(digits, 8)
            .map_err(|e| anyhow::anyhow!("invalid umask {:?}: {}", self.umask, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.pipe_dir, Path::new("/run/g13"));
        assert_eq!(settings.umask_bits().unwrap(), 0);
        assert!(settings.config.is_none());
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str("umask = \"022\"\n").unwrap();
        assert_eq!(settings.umask_bits().unwrap(), 0o022);
        assert_eq!(settings.pipe_dir, Path::new("/run/g13"));
    }

    #[test]
    fn test_full_file() {
        let settings: Settings = toml::from_str(
            r#"
pipe_dir = "/tmp/g13"
umask = "0o077"
config = "/etc/g13/default.bind"
log_level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(settings.pipe_dir, Path::new("/tmp/g13"));
        assert_eq!(settings.umask_bits().unwrap(), 0o077);
        assert_eq!(settings.config.as_deref(), Some(Path::new("/etc/g13/default.bind")));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_bad_umask() {
        let settings = Settings {
            umask: "9".to_string(),
            ..Settings::default()
        };
        assert!(settings.umask_bits().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g13d.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.log_level, "warn");
    }
}
