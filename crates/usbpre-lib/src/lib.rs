//! usbpre — wakes the front-panel controller of the Sound Devices USBPre.
//!
//! The device's onboard PIC stays dormant (no buttons, LEDs or phantom power)
//! until the host sends a fixed two-command vendor handshake. This crate
//! provides that handshake, a hot-plug monitor that runs it on every arrival,
//! and the configuration and hook plumbing around both.

pub mod arrival;
pub mod config;
pub mod device;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod monitor;
pub mod protocol;
pub mod sequence;
pub mod timer;

pub use error::UsbpreError;
