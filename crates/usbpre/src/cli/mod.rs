//! CLI subcommands — one-shot init, resident monitor, device listing, config.

mod config_cmd;
mod devices;
mod init;
mod monitor;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use usbpre_lib::UsbpreError;
pub(super) use usbpre_lib::config::Config;
pub(super) use usbpre_lib::device::{self, DiscoveredDevice};
pub(super) use usbpre_lib::error::Result;
pub(super) use usbpre_lib::protocol::USBPRE;
pub(super) use usbpre_lib::sequence::Stage;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Top-level and indented values line up on the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Serialize `value` as pretty JSON on stdout.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{text}");
    Ok(())
}

/// Load the config from `custom_path` (or the platform default) and validate it.
pub(super) fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let (config, warnings) = match custom_path {
        Some(p) => Config::load_from(p),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    config.validate().map_err(|errors| {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        UsbpreError::Config(joined)
    })?;
    Ok(config)
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct InitOutput {
    pub device: Option<String>,
    pub success: bool,
    pub stage: Option<Stage>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize the first connected USBPre once and exit
    Init,

    /// Stay resident and initialize the USBPre on every arrival
    Monitor,

    /// List connected USBPre devices
    Devices,

    /// Show current configuration and file path
    Config {
        /// Write the effective settings to the config file (creates it if missing)
        #[arg(long)]
        write: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Init => init::cmd_init(json, config_path),
        Command::Monitor => {
            if json {
                warn_json_unsupported("monitor");
            }
            monitor::cmd_monitor(config_path)
        }
        Command::Devices => devices::cmd_devices(json),
        Command::Config { write } => config_cmd::cmd_config(json, write, config_path),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Device:", "Result:"], &[]);
        // "Device:" = 7 + PADDING = 9
        assert_eq!(w, 9);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["Config file:"], &["transfer_timeout_ms:"]);
        // "transfer_timeout_ms:" = 20 + PADDING + 2 = 24
        assert_eq!(w, 24);
    }

    #[test]
    fn values_align_across_levels() {
        let w = kv_width(&["Top:"], &["Indent:"]);
        let top = format_kv("Top:", "V", w);
        let indent = format!("  {:<width$}{}", "Indent:", "V", width = w - 2);
        assert_eq!(top.find('V'), indent.find('V'));
    }

    #[test]
    fn format_kv_overlong_key_not_padded() {
        assert_eq!(format_kv("settle_delay_ms:", "1000", 10), "settle_delay_ms:1000");
    }
}

#[cfg(test)]
mod load_config_tests {
    use super::*;

    #[test]
    fn missing_custom_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "transfer_timeout_ms = 0\nsettle_delay_ms = 90000\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, UsbpreError::Config(_)));
        let msg = err.to_string();
        assert!(msg.contains("transfer_timeout_ms"));
        assert!(msg.contains("settle_delay_ms"));
    }
}

#[cfg(test)]
mod json_struct_tests {
    use super::*;

    #[test]
    fn init_output_failure_fields() {
        let output = InitOutput {
            device: Some("usb:001/004".into()),
            success: false,
            stage: Some(Stage::CommandInit),
            error: Some("command 1 (0x81) failed: pipe".into()),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["stage"], "command-init");
        assert_eq!(json["success"], false);
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    #[test]
    fn config_output_embeds_settings() {
        let output = ConfigOutput {
            config_file: None,
            config_file_exists: false,
            settings: Config::default(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert!(json["config_file"].is_null());
        assert_eq!(json["settings"]["settle_delay_ms"], 1000);
    }

    #[test]
    fn devices_output_empty() {
        let output = DevicesOutput {
            count: 0,
            devices: Vec::new(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["count"], 0);
        assert!(json["devices"].as_array().unwrap().is_empty());
    }
}
