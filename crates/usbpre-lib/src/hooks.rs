//! Outcome hooks — run user-defined commands after each initialization run.

use std::io;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::monitor::ArrivalReport;
use crate::sequence::Outcome;

/// Guard preventing concurrent hook execution (shared across success/failure hooks).
static HOOK_RUNNING: AtomicBool = AtomicBool::new(false);

/// Default timeout for hook commands (30 seconds).
const HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval when waiting for a hook process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the hook command matching a completed run's outcome.
///
/// Skipped arrivals run nothing. The command sees `USBPRE_OUTCOME`,
/// `USBPRE_STAGE` (empty on success) and `USBPRE_DEVICE` in its environment.
pub fn run_outcome_hook(report: &ArrivalReport, config: &Config) {
    let Some(outcome) = report.outcome() else {
        return;
    };
    let command = match outcome {
        Outcome::Success => &config.on_success_command,
        Outcome::Failed { .. } => &config.on_failure_command,
    };
    run_hook(command, hook_env(&report.location, outcome));
}

fn hook_env(location: &str, outcome: &Outcome) -> Vec<(&'static str, String)> {
    let result = if outcome.is_success() { "success" } else { "failed" };
    let stage = outcome.stage().map(|s| s.to_string()).unwrap_or_default();
    vec![
        ("USBPRE_OUTCOME", result.to_string()),
        ("USBPRE_STAGE", stage),
        ("USBPRE_DEVICE", location.to_string()),
    ]
}

/// Spawn a shell command in a background thread. Empty commands are ignored.
fn run_hook(command: &str, env: Vec<(&'static str, String)>) {
    let command = command.trim();
    if command.is_empty() {
        return;
    }
    if HOOK_RUNNING
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        log::warn!("hook skipped (previous hook still running): {command}");
        return;
    }
    let command = command.to_string();
    std::thread::spawn(move || {
        let result = run_hook_with_timeout(&command, &env, HOOK_TIMEOUT);
        HOOK_RUNNING.store(false, Ordering::SeqCst);
        match result {
            Ok(s) if !s.success() => {
                log::warn!("hook command exited with {s}: {command}");
            }
            Err(e) => {
                log::warn!("hook command failed: {e}: {command}");
            }
            _ => {}
        }
    });
}

/// Run a shell command with a timeout. Kills the process if it exceeds the deadline.
fn run_hook_with_timeout(
    command: &str,
    env: &[(&'static str, String)],
    timeout: Duration,
) -> io::Result<ExitStatus> {
    let mut cmd = if cfg!(windows) {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = std::process::Command::new("sh");
        c.args(["-c", command]);
        c
    };
    let mut child = cmd.envs(env.iter().map(|(k, v)| (*k, v.as_str()))).spawn()?;

    let max_polls = (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1) as u64;
    for _ in 0..max_polls {
        match child.try_wait()? {
            Some(status) => return Ok(status),
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }

    // Timed out, kill and reap
    log::warn!("hook command timed out after {timeout:?}, killing: {command}");
    let _ = child.kill();
    child.wait()
}
