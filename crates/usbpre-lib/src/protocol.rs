//! Protocol constants for the Sound Devices USBPre.
//!
//! Decoded from USB captures of the vendor's Windows driver. Both commands are
//! a single-byte host-to-device vendor control transfer against the same
//! request/value/index triple; only the payload byte differs. No response is
//! read back: a transfer that completes without a transport error is a success.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

// ── Identity ──

/// Sound Devices vendor ID.
pub const USBPRE_VID: u16 = 0x0926;

/// USBPre product ID.
pub const USBPRE_PID: u16 = 0x0100;

/// Vendor/product pair used to match devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Equality on vendor and product only. Serial numbers are not compared.
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VID:0x{:04X}, PID:0x{:04X}", self.vendor_id, self.product_id)
    }
}

/// The one device this crate knows how to initialize.
pub const USBPRE: DeviceIdentity = DeviceIdentity::new(USBPRE_VID, USBPRE_PID);

// ── Control request ──

/// bmRequestType: host-to-device | vendor | device (0x40).
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;

/// bRequest shared by both PIC commands.
pub const PIC_REQUEST: u8 = 0x01;

/// wValue shared by both PIC commands.
pub const PIC_VALUE: u16 = 0x00F0;

/// wIndex shared by both PIC commands.
pub const PIC_INDEX: u16 = 0x01F0;

/// Payload of the first command: initialize the PIC.
pub const PIC_INIT: u8 = 0x81;

/// Payload of the second command: activate the PIC.
pub const PIC_ACTIVATE: u8 = 0xC0;

// ── Timing ──

/// Mandated pause between the two commands, as observed from the vendor driver.
/// Not configurable.
pub const INTER_COMMAND_DELAY: Duration = Duration::from_secs(5);

/// Default settle time between an arrival notification and the open attempt.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Default per-transfer timeout.
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 1000;

// ── Commands ──

/// One of the two handshake commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    /// First command, payload 0x81.
    Init,
    /// Second command, payload 0xC0. Only valid after `Init` and the delay.
    Activate,
}

impl Command {
    pub fn payload(self) -> u8 {
        match self {
            Command::Init => PIC_INIT,
            Command::Activate => PIC_ACTIVATE,
        }
    }

    /// 1-based position in the handshake, as used in log lines.
    pub fn number(self) -> u8 {
        match self {
            Command::Init => 1,
            Command::Activate => 2,
        }
    }

    /// Full control request carrying this command.
    pub fn control(self) -> ControlCommand {
        ControlCommand {
            request_type: REQUEST_TYPE_VENDOR_OUT,
            request: PIC_REQUEST,
            value: PIC_VALUE,
            index: PIC_INDEX,
            payload: self.payload(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command {} (0x{:02X})", self.number(), self.payload())
    }
}

/// A single-byte vendor control transfer, as it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCommand {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub payload: u8,
}
