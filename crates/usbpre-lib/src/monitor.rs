//! Monitor loop — arrival → settle → guard → sequencer → report.
//!
//! The loop consumes any iterator of device references (in production the
//! [`Arrivals`](crate::arrival::Arrivals) stream) and never stops on a failed
//! run. The guard is the only shared state; handles never leave a run.
//!
//! [`Monitor::run`] handles arrivals one at a time, so in that loop the guard
//! never refuses one: arrivals reported during a run wait in the event stream
//! and are handled after it. Refusal only happens when [`Monitor::handle_arrival`]
//! is called from several threads at once, or when a stop request holds the
//! guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::device::DeviceRef;
use crate::guard::InitGuard;
use crate::sequence::{Outcome, Sequencer};
use crate::timer::Timer;

/// What happened to one arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalResult {
    /// A run executed to completion.
    Completed(Outcome),
    /// Another run held the guard; the arrival was dropped.
    Skipped,
}

/// One processed arrival, for hooks and callers that report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalReport {
    pub location: String,
    pub result: ArrivalResult,
}

impl ArrivalReport {
    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.result {
            ArrivalResult::Completed(outcome) => Some(outcome),
            ArrivalResult::Skipped => None,
        }
    }
}

/// Long-running initializer.
pub struct Monitor<T> {
    guard: InitGuard,
    sequencer: Sequencer<T>,
    settle_delay: Duration,
}

impl<T: Timer> Monitor<T> {
    pub fn new(timer: T, settle_delay: Duration) -> Self {
        Self {
            guard: InitGuard::new(),
            sequencer: Sequencer::new(timer),
            settle_delay,
        }
    }

    pub fn guard(&self) -> &InitGuard {
        &self.guard
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Process a single arrival. The reference is released before returning.
    pub fn handle_arrival<D: DeviceRef>(&self, device: D) -> ArrivalReport {
        let location = device.location();

        // The host needs a moment after reporting arrival before open succeeds.
        self.sequencer.timer().sleep(self.settle_delay);

        let Some(permit) = self.guard.try_enter() else {
            log::info!("initialization already in progress, skipping {location}");
            return ArrivalReport {
                location,
                result: ArrivalResult::Skipped,
            };
        };

        log::debug!("device detected at {location}, opening interface");
        let outcome = self.sequencer.run(&device);
        report_outcome(&location, &outcome);
        drop(permit);

        ArrivalReport {
            location,
            result: ArrivalResult::Completed(outcome),
        }
    }

    /// Handle every arrival until the source ends or `running` is cleared.
    ///
    /// `running` is checked between arrivals only; an active run always
    /// completes.
    pub fn run<I>(
        &self,
        arrivals: I,
        running: &AtomicBool,
        mut on_report: impl FnMut(&ArrivalReport),
    ) where
        I: IntoIterator,
        I::Item: DeviceRef,
    {
        for device in arrivals {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let report = self.handle_arrival(device);
            on_report(&report);
            if !running.load(Ordering::SeqCst) {
                log::info!("stop requested, monitor exiting");
                break;
            }
        }
    }
}

fn report_outcome(location: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Success => log::info!("{location}: successfully initialized - device ready"),
        Outcome::Failed { stage, error } => {
            log::error!("{location}: initialization failed at {stage}: {error}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockDeviceRef, MockEvent, MockLog, MockTimer};
    use crate::protocol::Command;
    use crate::sequence::Stage;

    fn monitor(log: &MockLog) -> Monitor<MockTimer> {
        Monitor::new(MockTimer::new(log), Duration::from_secs(1))
    }

    #[test]
    fn settle_delay_precedes_open() {
        let log = MockLog::new();
        let m = monitor(&log);
        m.handle_arrival(MockDeviceRef::new(1, &log));
        let events = log.events();
        assert_eq!(events[0], MockEvent::Slept(Duration::from_secs(1)));
        assert_eq!(events[1], MockEvent::Opened(1));
    }

    #[test]
    fn success_report_and_release() {
        let log = MockLog::new();
        let m = monitor(&log);
        let report = m.handle_arrival(MockDeviceRef::new(1, &log));
        assert_eq!(report.location, "mock://usbpre/1");
        assert_eq!(report.result, ArrivalResult::Completed(Outcome::Success));
        assert_eq!(log.released(1), 1);
        assert_eq!(log.events().last(), Some(&MockEvent::Released(1)));
    }

    #[test]
    fn held_guard_skips_without_opening() {
        let log = MockLog::new();
        let m = monitor(&log);
        let _permit = m.guard().try_enter().unwrap();
        let report = m.handle_arrival(MockDeviceRef::new(2, &log));
        assert_eq!(report.result, ArrivalResult::Skipped);
        assert!(report.outcome().is_none());
        assert_eq!(log.opened(2), 0);
        assert_eq!(log.released(2), 1);
    }

    #[test]
    fn failure_releases_guard() {
        let log = MockLog::new();
        let m = monitor(&log);
        let report = m.handle_arrival(MockDeviceRef::new(1, &log).failing_on(Command::Init));
        assert_eq!(report.outcome().and_then(Outcome::stage), Some(Stage::CommandInit));
        assert!(m.guard().try_enter().is_some());
    }

    #[test]
    fn run_continues_after_failures() {
        let log = MockLog::new();
        let m = monitor(&log);
        let running = AtomicBool::new(true);
        let devices = vec![
            MockDeviceRef::new(1, &log).failing_open(),
            MockDeviceRef::new(2, &log).failing_on(Command::Activate),
            MockDeviceRef::new(3, &log),
        ];
        let mut reports = Vec::new();
        m.run(devices, &running, |r| reports.push(r.clone()));
        assert_eq!(reports.len(), 3);
        assert_eq!(
            reports[2].result,
            ArrivalResult::Completed(Outcome::Success)
        );
        let stats = m.guard().stats();
        assert_eq!(stats.admitted, 3);
        assert_eq!(stats.released, 3);
    }

    #[test]
    fn sequential_run_handles_back_to_back_arrivals_in_turn() {
        let log = MockLog::new();
        let m = monitor(&log);
        let running = AtomicBool::new(true);
        let devices = vec![MockDeviceRef::new(1, &log), MockDeviceRef::new(2, &log)];
        let mut results = Vec::new();
        m.run(devices, &running, |r| results.push(r.result.clone()));
        assert_eq!(
            results,
            vec![
                ArrivalResult::Completed(Outcome::Success),
                ArrivalResult::Completed(Outcome::Success),
            ]
        );
        assert_eq!(m.guard().stats().dropped, 0);
        // The second device is only opened after the first handle is closed.
        let events = log.events();
        let closed_1 = events.iter().position(|e| *e == MockEvent::Closed(1)).unwrap();
        let opened_2 = events.iter().position(|e| *e == MockEvent::Opened(2)).unwrap();
        assert!(closed_1 < opened_2);
    }

    #[test]
    fn settle_delay_accessor() {
        assert_eq!(monitor(&MockLog::new()).settle_delay(), Duration::from_secs(1));
    }

    #[test]
    fn run_stops_after_current_arrival_when_cleared() {
        let log = MockLog::new();
        let m = monitor(&log);
        let running = AtomicBool::new(true);
        let devices = vec![MockDeviceRef::new(1, &log), MockDeviceRef::new(2, &log)];
        let mut seen = 0;
        m.run(devices, &running, |_| {
            seen += 1;
            running.store(false, Ordering::SeqCst);
        });
        assert_eq!(seen, 1);
        assert_eq!(log.opened(1), 1);
        assert_eq!(log.opened(2), 0);
    }
}
