//! `monitor` subcommand — initialize the USBPre on every arrival until stopped.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use usbpre_lib::arrival;
use usbpre_lib::guard::{InitGuard, InitPermit};
use usbpre_lib::hooks;
use usbpre_lib::monitor::Monitor;
use usbpre_lib::timer::ThreadTimer;

use super::{RUNNING, Result, USBPRE};

pub(super) fn cmd_monitor(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let arrivals = arrival::subscribe(USBPRE, config.transfer_timeout())?;
    let monitor = Arc::new(Monitor::new(ThreadTimer, config.settle_delay()));
    install_stop_handler(Arc::clone(&monitor));

    log::info!(
        "monitoring for {USBPRE} (settle delay {}ms)",
        monitor.settle_delay().as_millis()
    );

    monitor.run(arrivals, &RUNNING, |report| {
        hooks::run_outcome_hook(report, &config);
    });

    let stats = monitor.guard().stats();
    log::info!(
        "monitor stopped after {} run(s), {} arrival(s) skipped",
        stats.admitted,
        stats.dropped
    );
    Ok(())
}

/// Decide what a stop request means right now.
///
/// Returns a permit when no run is active: the caller exits while holding it,
/// so an arrival still in its settle delay is skipped instead of starting a
/// run the exit would cut off. Otherwise clears `running` so the loop stops
/// once the active run completes.
fn request_stop<'a>(guard: &'a InitGuard, running: &AtomicBool) -> Option<InitPermit<'a>> {
    let permit = guard.try_enter();
    if permit.is_none() {
        running.store(false, Ordering::SeqCst);
    }
    permit
}

/// Ctrl+C / SIGTERM: exit at once when idle, otherwise let the active run
/// finish and stop the loop after it.
fn install_stop_handler(monitor: Arc<Monitor<ThreadTimer>>) {
    let result = ctrlc::set_handler(move || {
        if let Some(_permit) = request_stop(monitor.guard(), &RUNNING) {
            log::info!("stop requested while idle, exiting");
            std::process::exit(0);
        }
        log::info!("stop requested, finishing current initialization");
    });
    if let Err(e) = result {
        log::warn!("could not install stop handler: {e}");
    }
}
