//! Unified error type for the usbpre-lib crate.
//!
//! [`UsbpreError`] wraps [`DeviceError`] plus I/O and configuration failures.
//! `From` impls allow `?` to propagate across module boundaries.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for usbpre-lib operations.
#[derive(Debug)]
pub enum UsbpreError {
    /// Device discovery, open, transfer or subscription error.
    Device(DeviceError),
    /// Standard I/O error (file read/write, config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for UsbpreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbpreError::Device(e) => write!(f, "{e}"),
            UsbpreError::Io(e) => write!(f, "I/O error: {e}"),
            UsbpreError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for UsbpreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UsbpreError::Device(e) => Some(e),
            UsbpreError::Io(e) => Some(e),
            UsbpreError::Config(_) => None,
        }
    }
}

impl From<DeviceError> for UsbpreError {
    fn from(e: DeviceError) -> Self {
        UsbpreError::Device(e)
    }
}

impl From<std::io::Error> for UsbpreError {
    fn from(e: std::io::Error) -> Self {
        UsbpreError::Io(e)
    }
}

/// Crate-level Result alias using [`UsbpreError`].
pub type Result<T> = std::result::Result<T, UsbpreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    #[test]
    fn from_device_error() {
        let e: UsbpreError = DeviceError::NotFound.into();
        assert!(matches!(e, UsbpreError::Device(DeviceError::NotFound)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: UsbpreError = io_err.into();
        assert!(matches!(e, UsbpreError::Io(_)));
    }

    #[test]
    fn display_device_error_is_transparent() {
        let e = UsbpreError::Device(DeviceError::NotFound);
        assert_eq!(e.to_string(), "USBPre not found. Is it plugged in?");
    }

    #[test]
    fn display_config_error() {
        let e = UsbpreError::Config("transfer_timeout_ms must be > 0".into());
        assert_eq!(e.to_string(), "Config error: transfer_timeout_ms must be > 0");
    }

    #[test]
    fn source_chains_device_error() {
        let e = UsbpreError::Device(DeviceError::TransferFailed {
            command: Command::Init,
            reason: "timeout".into(),
        });
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("timeout"));
    }

    #[test]
    fn source_none_for_config() {
        let e = UsbpreError::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_device_to_usbpre() {
        fn inner() -> crate::device::Result<()> {
            Err(DeviceError::NotFound)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, UsbpreError::Device(DeviceError::NotFound)));
    }
}
