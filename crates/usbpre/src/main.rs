//! usbpre — bring the Sound Devices USBPre out of its power-on state.
//!
//! `init` runs the handshake once; `monitor` stays resident and runs it on
//! every hot-plug (the launchd/systemd units in `dist/` start it at boot).

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Parser;

mod cli;

/// Shared shutdown flag, cleared by the Ctrl+C / SIGTERM handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "usbpre",
    version,
    about = "Initialize the Sound Devices USBPre on demand or on every hot-plug"
)]
struct Args {
    /// Output as JSON (for init, devices, config)
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

fn default_log_filter(command: &cli::Command, verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else if matches!(command, cli::Command::Monitor) {
        "info"
    } else {
        "warn"
    }
}

fn main() {
    let args = Args::parse();

    let filter = default_log_filter(&args.command, args.verbose);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_logs_notices_by_default() {
        assert_eq!(default_log_filter(&cli::Command::Monitor, false), "info");
        assert_eq!(default_log_filter(&cli::Command::Init, false), "warn");
    }

    #[test]
    fn verbose_wins() {
        assert_eq!(default_log_filter(&cli::Command::Devices, true), "debug");
        assert_eq!(default_log_filter(&cli::Command::Monitor, true), "debug");
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from(["usbpre", "config", "--json", "-v", "--config", "x.toml"])
            .unwrap();
        assert!(args.json);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn subcommand_required() {
        assert!(Args::try_parse_from(["usbpre"]).is_err());
    }
}
