//! Configuration for headterm.
//!
//! Settings are read from `~/.headterm/config.toml`. Every section and
//! field is optional:
//!
//! ```toml
//! [terminal]
//! cols = 120
//! rows = 40
//! scrollback_limit = 5000
//! # "cancel-bold" (default) or "double-underline"
//! sgr21_policy = "cancel-bold"
//!
//! [shell]
//! program = "/bin/bash"
//! args = ["-l"]
//! working_dir = "/tmp"
//! env = { LANG = "C.UTF-8" }
//!
//! [session]
//! stop_timeout_ms = 1000
//!
//! [log]
//! level = "info"
//! file = "/tmp/headterm.log"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::session::SessionOptions;
use crate::core::term::{Sgr21Policy, DEFAULT_SCROLLBACK_LIMIT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config path")]
    NoHome,
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub terminal: TerminalConfig,
    pub shell: ShellConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

/// Terminal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub cols: u16,
    pub rows: u16,
    pub scrollback_limit: usize,
    pub sgr21_policy: Sgr21Policy,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
            sgr21_policy: Sgr21Policy::default(),
        }
    }
}

/// Shell settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Program to run; the user's default shell when unset
    pub program: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

/// Session lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Grace period before a child is killed on close
    pub stop_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 1000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `HEADTERM_LOG` is not set
    pub level: String,
    /// Log file; `~/.headterm/headterm.log` when unset
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when it is missing or invalid
    pub fn load() -> Self {
        let Some(path) = Self::get_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::get_config_path().ok_or(ConfigError::NoHome)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding the config and log files
    pub fn config_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".headterm");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log
            .file
            .clone()
            .or_else(|| Self::config_dir().map(|dir| dir.join("headterm.log")))
            .unwrap_or_else(|| PathBuf::from("headterm.log"))
    }

    /// Session options described by this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            size: Some((self.terminal.cols, self.terminal.rows)),
            scrollback_limit: self.terminal.scrollback_limit,
            sgr21_policy: self.terminal.sgr21_policy,
            program: self.shell.program.clone(),
            args: self.shell.args.clone(),
            working_dir: self.shell.working_dir.clone(),
            env: self
                .shell
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            stop_timeout: Duration::from_millis(self.session.stop_timeout_ms),
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [terminal]
            cols = 132
            sgr21_policy = "double-underline"

            [shell]
            program = "/bin/sh"
            env = { FOO = "bar" }
            "#,
        )
        .expect("parse");
        assert_eq!(config.terminal.cols, 132);
        assert_eq!(config.terminal.rows, 24);
        assert_eq!(config.terminal.sgr21_policy, Sgr21Policy::DoubleUnderline);
        assert_eq!(config.session.stop_timeout_ms, 1000);
        assert_eq!(config.log.level, "info");

        let options = config.session_options();
        assert_eq!(options.size, Some((132, 24)));
        assert_eq!(options.program.as_deref(), Some("/bin/sh"));
        assert_eq!(options.env, vec![("FOO".to_string(), "bar".to_string())]);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.terminal.scrollback_limit = 42;
        config.shell.args = vec!["-l".to_string()];
        config.save_to(&path).expect("save");
        assert_eq!(Config::load_from(&path).expect("load"), config);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[terminal\ncols = ").expect("write");
        let err = Config::load_from(&path).expect_err("invalid toml");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load_from(&missing),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[terminal]\nsgr21_policy = \"blink\"\n");
        assert!(result.is_err());
    }
}
