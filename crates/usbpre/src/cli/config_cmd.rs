//! `config` subcommand — show current configuration and file path.

use std::path::Path;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(json: bool, write: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path)?;
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);

    if write {
        let Some(path) = &config_path else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            )
            .into());
        };
        config.save_to(path)?;
        log::info!("wrote {}", path.display());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
        });
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "settle_delay_ms:",
            "transfer_timeout_ms:",
            "on_success_command:",
            "on_failure_command:",
        ],
    );

    match &config_path {
        Some(p) if write => kv("Config file:", format_args!("{} (written)", p.display()), w),
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent("settle_delay_ms:", config.settle_delay_ms, w);
    kv_indent("transfer_timeout_ms:", config.transfer_timeout_ms, w);
    let hook_label = |cmd: &str| {
        if cmd.trim().is_empty() {
            "(none)".to_string()
        } else {
            cmd.to_string()
        }
    };
    kv_indent("on_success_command:", hook_label(&config.on_success_command), w);
    kv_indent("on_failure_command:", hook_label(&config.on_failure_command), w);
    Ok(())
}
