//! Application configuration — TOML-based, platform-aware paths.
//!
//! Device identity and the 5 s inter-command delay are protocol constants and
//! deliberately absent here.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{DEFAULT_SETTLE_DELAY_MS, DEFAULT_TRANSFER_TIMEOUT_MS};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# usbpre configuration\n\n";

/// Upper bound for `settle_delay_ms`.
pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;

/// Upper bound for `transfer_timeout_ms`.
pub const MAX_TRANSFER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Pause between an arrival notification and opening the device. Default: 1000.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Timeout for each control transfer. Default: 1000.
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    /// Command to run after a successful initialization. Empty = disabled.
    #[serde(default)]
    pub on_success_command: String,

    /// Command to run after a failed initialization. Empty = disabled.
    #[serde(default)]
    pub on_failure_command: String,
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}
fn default_transfer_timeout_ms() -> u64 {
    DEFAULT_TRANSFER_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settle_delay_ms: default_settle_delay_ms(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            on_success_command: String::new(),
            on_failure_command: String::new(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `transfer_timeout_ms` is zero.
    ZeroTransferTimeout,
    /// `transfer_timeout_ms` exceeds [`MAX_TRANSFER_TIMEOUT_MS`].
    TransferTimeoutTooLong(u64),
    /// `settle_delay_ms` exceeds [`MAX_SETTLE_DELAY_MS`].
    SettleDelayTooLong(u64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroTransferTimeout => {
                write!(f, "transfer_timeout_ms must be greater than 0")
            }
            ValidationError::TransferTimeoutTooLong(ms) => write!(
                f,
                "transfer_timeout_ms is {ms} (max {MAX_TRANSFER_TIMEOUT_MS})"
            ),
            ValidationError::SettleDelayTooLong(ms) => {
                write!(f, "settle_delay_ms is {ms} (max {MAX_SETTLE_DELAY_MS})")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("usbpre"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.transfer_timeout_ms == 0 {
            errors.push(ValidationError::ZeroTransferTimeout);
        } else if self.transfer_timeout_ms > MAX_TRANSFER_TIMEOUT_MS {
            errors.push(ValidationError::TransferTimeoutTooLong(
                self.transfer_timeout_ms,
            ));
        }

        if self.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            errors.push(ValidationError::SettleDelayTooLong(self.settle_delay_ms));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
