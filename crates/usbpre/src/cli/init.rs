//! `init` subcommand — run the two-command handshake once on the first USBPre found.

use std::path::Path;

use usbpre_lib::device::DeviceRef;
use usbpre_lib::protocol::INTER_COMMAND_DELAY;
use usbpre_lib::sequence::{Outcome, Sequencer};
use usbpre_lib::timer::ThreadTimer;

use super::{InitOutput, Result, USBPRE, device, print_json};

pub(super) fn cmd_init(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let dev = match device::find_device(&USBPRE, config.transfer_timeout()) {
        Ok(dev) => dev,
        Err(e) => {
            if json {
                print_json(&InitOutput {
                    device: None,
                    success: false,
                    stage: None,
                    error: Some(e.to_string()),
                })?;
            }
            return Err(e.into());
        }
    };
    let location = dev.location();

    if !json {
        println!("[device] {USBPRE} at {location}");
        println!(
            "[init]   sending command 1, then command 2 after {}s",
            INTER_COMMAND_DELAY.as_secs()
        );
    }

    let outcome = Sequencer::new(ThreadTimer).run(&dev);
    drop(dev);

    if json {
        print_json(&init_output(&location, &outcome))?;
    } else if outcome.is_success() {
        println!("[init]   successfully initialized - device ready");
    }

    outcome.into_result().map_err(Into::into)
}

fn init_output(location: &str, outcome: &Outcome) -> InitOutput {
    let (stage, error) = match outcome {
        Outcome::Success => (None, None),
        Outcome::Failed { stage, error } => (Some(*stage), Some(error.to_string())),
    };
    InitOutput {
        device: Some(location.to_string()),
        success: outcome.is_success(),
        stage,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbpre_lib::device::DeviceError;
    use usbpre_lib::protocol::Command;
    use usbpre_lib::sequence::Stage;

    #[test]
    fn success_output_has_no_stage() {
        let out = init_output("usb:001/004", &Outcome::Success);
        assert!(out.success);
        assert!(out.stage.is_none());
        assert!(out.error.is_none());
        assert_eq!(out.device.as_deref(), Some("usb:001/004"));
    }

    #[test]
    fn failure_output_names_stage_and_error() {
        let outcome = Outcome::Failed {
            stage: Stage::CommandActivate,
            error: DeviceError::TransferFailed {
                command: Command::Activate,
                reason: "timeout".into(),
            },
        };
        let out = init_output("usb:001/004", &outcome);
        assert!(!out.success);
        assert_eq!(out.stage, Some(Stage::CommandActivate));
        assert!(out.error.unwrap().contains("timeout"));
    }
}
