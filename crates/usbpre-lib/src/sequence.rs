//! Initialization sequencer — the two-command PIC handshake.
//!
//! Open → command 1 (0x81) → mandated 5 s delay → command 2 (0xC0) → close.
//! The sequencer never retries: a failure at any stage ends the run and is
//! reported upward. The handle is owned by [`Sequencer::run`] and dropped
//! (closed) before it returns, whatever the outcome.

use std::fmt;

use serde::Serialize;

use crate::device::{DeviceError, DeviceHandle, DeviceRef};
use crate::protocol::{Command, INTER_COMMAND_DELAY};
use crate::timer::Timer;

/// Step of the handshake at which a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Open,
    CommandInit,
    CommandActivate,
}

impl From<Command> for Stage {
    fn from(command: Command) -> Self {
        match command {
            Command::Init => Stage::CommandInit,
            Command::Activate => Stage::CommandActivate,
        }
    }
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Open => "open",
            Stage::CommandInit => "command-init",
            Stage::CommandActivate => "command-activate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one initialization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed { stage: Stage, error: DeviceError },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Outcome::Success => None,
            Outcome::Failed { stage, .. } => Some(*stage),
        }
    }

    /// Collapse into a `Result` for callers that treat failure as terminal.
    pub fn into_result(self) -> crate::device::Result<()> {
        match self {
            Outcome::Success => Ok(()),
            Outcome::Failed { error, .. } => Err(error),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed { stage, error } => write!(f, "failed at {stage}: {error}"),
        }
    }
}

/// Drives the handshake against one device reference at a time.
#[derive(Debug, Clone)]
pub struct Sequencer<T> {
    timer: T,
}

impl<T: Timer> Sequencer<T> {
    pub fn new(timer: T) -> Self {
        Self { timer }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Run the full handshake against `device`.
    pub fn run<D: DeviceRef>(&self, device: &D) -> Outcome {
        log::debug!("opening {}", device.location());
        let mut handle = match device.open() {
            Ok(h) => h,
            Err(error) => {
                log::error!("could not open {}: {error}", device.location());
                return Outcome::Failed {
                    stage: Stage::Open,
                    error,
                };
            }
        };

        log::info!("starting PIC initialization on {}", device.location());
        let outcome = self.handshake(&mut handle);
        drop(handle);
        outcome
    }

    fn handshake(&self, handle: &mut impl DeviceHandle) -> Outcome {
        if let Err(error) = send(handle, Command::Init) {
            return error;
        }

        self.mandated_delay();

        if let Err(error) = send(handle, Command::Activate) {
            return error;
        }

        log::info!("PIC initialization complete");
        Outcome::Success
    }

    /// Fixed pause between the two commands. Not a poll or backoff.
    fn mandated_delay(&self) {
        log::debug!("waiting {}s before activation", INTER_COMMAND_DELAY.as_secs());
        self.timer.sleep(INTER_COMMAND_DELAY);
    }
}

fn send(handle: &mut impl DeviceHandle, command: Command) -> Result<(), Outcome> {
    match handle.send_command(command) {
        Ok(()) => {
            log::debug!("{command} succeeded");
            Ok(())
        }
        Err(error) => {
            log::error!("{error}");
            Err(Outcome::Failed {
                stage: command.into(),
                error,
            })
        }
    }
}
