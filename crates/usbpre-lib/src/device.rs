//! Device access — DeviceRef/DeviceHandle traits + nusb backend.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::{Command, DEFAULT_TRANSFER_TIMEOUT_MS, DeviceIdentity};

// ── Error type ──

/// Device communication errors.
///
/// String payloads follow the convention **"context: details"** where *context*
/// identifies the operation (e.g. `"USB open"`, `"control_out(bRequest=1)"`) and
/// *details* is the underlying platform error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    NotFound,
    /// The host could not list USB devices at all.
    EnumerationFailed(String),
    OpenFailed(String),
    TransferFailed { command: Command, reason: String },
    SubscribeFailed(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(f, "USBPre not found. Is it plugged in?"),
            DeviceError::EnumerationFailed(e) => write!(f, "Failed to list USB devices: {e}"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::TransferFailed { command, reason } => {
                write!(f, "{command} failed: {reason}")
            }
            DeviceError::SubscribeFailed(e) => {
                write!(f, "Failed to watch for device arrivals: {e}")
            }
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Traits ──

/// An opened connection to one device instance.
///
/// Dropping the handle closes it, so every exit path closes exactly once.
pub trait DeviceHandle {
    /// Issue one handshake command as a host-to-device vendor control transfer.
    fn send_command(&mut self, command: Command) -> Result<()>;
}

/// A matched but not yet opened device, as reported by enumeration or hot-plug.
///
/// Dropping the reference releases it.
pub trait DeviceRef {
    type Handle: DeviceHandle;
    /// Stable per-connection identifier (changes on replug).
    type Key: Clone + Eq + Hash + fmt::Debug;

    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn key(&self) -> Self::Key;
    /// Human-readable bus location for log lines.
    fn location(&self) -> String;
    fn open(&self) -> Result<Self::Handle>;

    fn matches(&self, identity: &DeviceIdentity) -> bool {
        identity.matches(self.vendor_id(), self.product_id())
    }
}

// ── nusb implementation ──

/// Host device reference backed by [`nusb::DeviceInfo`].
#[derive(Debug, Clone)]
pub struct UsbDeviceRef {
    info: nusb::DeviceInfo,
    timeout: Duration,
}

impl UsbDeviceRef {
    pub fn new(info: nusb::DeviceInfo) -> Self {
        Self {
            info,
            timeout: Duration::from_millis(DEFAULT_TRANSFER_TIMEOUT_MS),
        }
    }

    /// Per-transfer timeout used by handles opened from this reference.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn info(&self) -> &nusb::DeviceInfo {
        &self.info
    }
}

fn describe_location(info: &nusb::DeviceInfo) -> String {
    #[cfg(target_os = "linux")]
    {
        format!("usb:{:03}/{:03}", info.bus_number(), info.device_address())
    }
    #[cfg(not(target_os = "linux"))]
    {
        format!("usb:{:03}", info.device_address())
    }
}

impl DeviceRef for UsbDeviceRef {
    type Handle = UsbDeviceHandle;
    type Key = nusb::DeviceId;

    fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.info.product_id()
    }

    fn key(&self) -> nusb::DeviceId {
        self.info.id()
    }

    fn location(&self) -> String {
        describe_location(&self.info)
    }

    fn open(&self) -> Result<UsbDeviceHandle> {
        let device = self
            .info
            .open()
            .map_err(|e| DeviceError::OpenFailed(format!("USB open: {e}")))?;

        // Windows has no device-level control endpoint in nusb; go through interface 0.
        #[cfg(windows)]
        let interface = device
            .claim_interface(0)
            .map_err(|e| DeviceError::OpenFailed(format!("claim interface 0: {e}")))?;

        Ok(UsbDeviceHandle {
            device,
            #[cfg(windows)]
            interface,
            timeout: self.timeout,
        })
    }
}

/// Open USB connection. Closed when dropped.
pub struct UsbDeviceHandle {
    #[cfg_attr(windows, allow(dead_code))]
    device: nusb::Device,
    #[cfg(windows)]
    interface: nusb::Interface,
    timeout: Duration,
}

impl DeviceHandle for UsbDeviceHandle {
    fn send_command(&mut self, command: Command) -> Result<()> {
        use nusb::transfer::{Control, ControlType, Recipient};

        let cmd = command.control();
        let control = Control {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: cmd.request,
            value: cmd.value,
            index: cmd.index,
        };
        log::debug!(
            "control_out type=0x{:02X} req=0x{:02X} value=0x{:04X} index=0x{:04X} data=0x{:02X}",
            cmd.request_type,
            cmd.request,
            cmd.value,
            cmd.index,
            cmd.payload
        );

        #[cfg(not(windows))]
        let result = self
            .device
            .control_out_blocking(control, &[cmd.payload], self.timeout);
        #[cfg(windows)]
        let result = self
            .interface
            .control_out_blocking(control, &[cmd.payload], self.timeout);

        result
            .map(|_| ())
            .map_err(|e| DeviceError::TransferFailed {
                command,
                reason: format!("control_out(bRequest={}): {e}", cmd.request),
            })
    }
}

// ── Device enumeration ──

/// A matching device found on the bus (not opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Bus location, e.g. `usb:001/004 [0926:0100]`.
    pub path: String,
    /// USB serial number, if the device reports one.
    pub serial: Option<String>,
    /// USB product string, if the device reports one.
    pub product: Option<String>,
}

/// All currently connected devices matching `identity`.
pub fn list_matching(identity: &DeviceIdentity) -> Result<Vec<UsbDeviceRef>> {
    let devices = nusb::list_devices()
        .map_err(enumeration_failed)?;
    Ok(devices
        .filter(|dev| identity.matches(dev.vendor_id(), dev.product_id()))
        .map(UsbDeviceRef::new)
        .collect())
}

fn enumeration_failed(e: std::io::Error) -> DeviceError {
    DeviceError::EnumerationFailed(e.to_string())
}

/// Enumerate matching devices for display.
///
/// Returns an empty list when enumeration itself fails.
pub fn enumerate_devices(identity: &DeviceIdentity) -> Vec<DiscoveredDevice> {
    let Ok(devices) = list_matching(identity) else {
        return Vec::new();
    };
    devices
        .iter()
        .map(|dev| {
            let info = dev.info();
            DiscoveredDevice {
                path: format!(
                    "{} [{:04x}:{:04x}]",
                    dev.location(),
                    info.vendor_id(),
                    info.product_id()
                ),
                serial: info.serial_number().map(|s| s.to_string()),
                product: info.product_string().map(|s| s.to_string()),
            }
        })
        .collect()
}

/// First connected device matching `identity`, or [`DeviceError::NotFound`].
pub fn find_device(identity: &DeviceIdentity, timeout: Duration) -> Result<UsbDeviceRef> {
    list_matching(identity)?
        .into_iter()
        .next()
        .map(|dev| dev.with_timeout(timeout))
        .ok_or(DeviceError::NotFound)
}

// ── Mock device for testing ──

/// In-memory devices and timer for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs. Every mock
/// writes into a shared [`MockLog`](mock::MockLog) so tests can assert on the
/// exact interleaving of opens, transfers, delays, closes and releases.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Instant;

    use crate::protocol::{ControlCommand, USBPRE};
    use crate::timer::Timer;

    #[derive(Debug, Clone, PartialEq)]
    pub enum MockEvent {
        Opened(u32),
        /// Transfer completed without error.
        Sent {
            key: u32,
            command: ControlCommand,
            at: Instant,
        },
        /// Transfer attempted and failed with an injected transport error.
        Rejected { key: u32, command: Command },
        Closed(u32),
        Released(u32),
        Slept(Duration),
    }

    /// Shared, thread-safe event recorder.
    #[derive(Debug, Clone, Default)]
    pub struct MockLog(Arc<Mutex<Vec<MockEvent>>>);

    impl MockLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, event: MockEvent) {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }

        pub fn events(&self) -> Vec<MockEvent> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
            self.events().iter().filter(|e| pred(e)).count()
        }

        pub fn opened(&self, key: u32) -> usize {
            self.count(|e| *e == MockEvent::Opened(key))
        }

        pub fn closed(&self, key: u32) -> usize {
            self.count(|e| *e == MockEvent::Closed(key))
        }

        pub fn released(&self, key: u32) -> usize {
            self.count(|e| *e == MockEvent::Released(key))
        }

        /// Payload bytes of every successful transfer, in order.
        pub fn payloads(&self) -> Vec<u8> {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    MockEvent::Sent { command, .. } => Some(command.payload),
                    _ => None,
                })
                .collect()
        }

        /// Every transfer attempt (successful or not), in order.
        pub fn attempts(&self) -> Vec<u8> {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    MockEvent::Sent { command, .. } => Some(command.payload),
                    MockEvent::Rejected { command, .. } => Some(command.payload()),
                    _ => None,
                })
                .collect()
        }
    }

    /// Device reference with per-stage failure injection.
    pub struct MockDeviceRef {
        key: u32,
        vendor_id: u16,
        product_id: u16,
        fail_open: bool,
        fail_command: Option<Command>,
        log: MockLog,
    }

    impl MockDeviceRef {
        /// A USBPre that opens and accepts both commands.
        pub fn new(key: u32, log: &MockLog) -> Self {
            Self {
                key,
                vendor_id: USBPRE.vendor_id,
                product_id: USBPRE.product_id,
                fail_open: false,
                fail_command: None,
                log: log.clone(),
            }
        }

        pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
            self.vendor_id = identity.vendor_id;
            self.product_id = identity.product_id;
            self
        }

        /// Simulate the device disappearing between arrival and open.
        pub fn failing_open(mut self) -> Self {
            self.fail_open = true;
            self
        }

        /// Make `command` fail with a transport error.
        pub fn failing_on(mut self, command: Command) -> Self {
            self.fail_command = Some(command);
            self
        }
    }

    impl DeviceRef for MockDeviceRef {
        type Handle = MockHandle;
        type Key = u32;

        fn vendor_id(&self) -> u16 {
            self.vendor_id
        }

        fn product_id(&self) -> u16 {
            self.product_id
        }

        fn key(&self) -> u32 {
            self.key
        }

        fn location(&self) -> String {
            format!("mock://usbpre/{}", self.key)
        }

        fn open(&self) -> Result<MockHandle> {
            if self.fail_open {
                return Err(DeviceError::OpenFailed(
                    "USB open: mock: no such device".into(),
                ));
            }
            self.log.push(MockEvent::Opened(self.key));
            Ok(MockHandle {
                key: self.key,
                fail_command: self.fail_command,
                log: self.log.clone(),
            })
        }
    }

    impl Drop for MockDeviceRef {
        fn drop(&mut self) {
            self.log.push(MockEvent::Released(self.key));
        }
    }

    pub struct MockHandle {
        key: u32,
        fail_command: Option<Command>,
        log: MockLog,
    }

    impl DeviceHandle for MockHandle {
        fn send_command(&mut self, command: Command) -> Result<()> {
            if self.fail_command == Some(command) {
                self.log.push(MockEvent::Rejected {
                    key: self.key,
                    command,
                });
                return Err(DeviceError::TransferFailed {
                    command,
                    reason: "control_out(bRequest=1): mock: pipe error".into(),
                });
            }
            self.log.push(MockEvent::Sent {
                key: self.key,
                command: command.control(),
                at: Instant::now(),
            });
            Ok(())
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.log.push(MockEvent::Closed(self.key));
        }
    }

    /// Timer that records the requested delay instead of sleeping.
    #[derive(Debug, Clone)]
    pub struct MockTimer {
        log: MockLog,
    }

    impl MockTimer {
        pub fn new(log: &MockLog) -> Self {
            Self { log: log.clone() }
        }
    }

    impl Timer for MockTimer {
        fn sleep(&self, duration: Duration) {
            self.log.push(MockEvent::Slept(duration));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockDeviceRef, MockEvent, MockLog};
    use super::*;
    use crate::protocol::USBPRE;

    #[test]
    fn display_not_found() {
        assert_eq!(
            DeviceError::NotFound.to_string(),
            "USBPre not found. Is it plugged in?"
        );
    }

    #[test]
    fn display_transfer_failed_names_command() {
        let e = DeviceError::TransferFailed {
            command: Command::Activate,
            reason: "timeout".into(),
        };
        assert_eq!(e.to_string(), "command 2 (0xC0) failed: timeout");
    }

    #[test]
    fn display_enumeration_failed_is_not_an_open_error() {
        let e = DeviceError::EnumerationFailed("permission denied".into());
        assert_eq!(e.to_string(), "Failed to list USB devices: permission denied");
        assert!(!e.to_string().contains("open"));
    }

    #[test]
    fn enumeration_error_maps_to_enumeration_variant() {
        let e = enumeration_failed(std::io::Error::other("permission denied"));
        assert_eq!(e, DeviceError::EnumerationFailed("permission denied".into()));
    }

    #[test]
    fn display_open_failed() {
        let e = DeviceError::OpenFailed("USB open: busy".into());
        assert_eq!(e.to_string(), "Failed to open device: USB open: busy");
    }

    #[test]
    fn discovered_device_serializes() {
        let dev = DiscoveredDevice {
            path: "usb:001/004 [0926:0100]".into(),
            serial: None,
            product: Some("USBPre".into()),
        };
        let json = serde_json::to_value(&dev).unwrap();
        assert_eq!(json["path"], "usb:001/004 [0926:0100]");
        assert!(json["serial"].is_null());
        assert_eq!(json["product"], "USBPre");
    }

    #[test]
    fn enumerate_devices_returns_vec() {
        // No hardware assumed; just must not panic.
        let _ = enumerate_devices(&USBPRE);
    }

    #[test]
    fn default_matches_uses_identity() {
        let log = MockLog::new();
        let usbpre = MockDeviceRef::new(1, &log);
        let other = MockDeviceRef::new(2, &log).with_identity(DeviceIdentity::new(0x0926, 0x0200));
        assert!(usbpre.matches(&USBPRE));
        assert!(!other.matches(&USBPRE));
    }

    #[test]
    fn mock_handle_closes_on_drop() {
        let log = MockLog::new();
        let dev = MockDeviceRef::new(7, &log);
        {
            let mut h = dev.open().unwrap();
            h.send_command(Command::Init).unwrap();
        }
        assert_eq!(log.opened(7), 1);
        assert_eq!(log.closed(7), 1);
        assert_eq!(log.payloads(), vec![0x81]);
        drop(dev);
        assert_eq!(log.released(7), 1);
    }

    #[test]
    fn mock_failing_open_does_not_log_open() {
        let log = MockLog::new();
        let dev = MockDeviceRef::new(3, &log).failing_open();
        assert!(matches!(dev.open(), Err(DeviceError::OpenFailed(_))));
        assert_eq!(log.opened(3), 0);
    }

    #[test]
    fn mock_injected_transfer_error() {
        let log = MockLog::new();
        let dev = MockDeviceRef::new(4, &log).failing_on(Command::Activate);
        let mut h = dev.open().unwrap();
        assert!(h.send_command(Command::Init).is_ok());
        let err = h.send_command(Command::Activate).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::TransferFailed {
                command: Command::Activate,
                ..
            }
        ));
        assert_eq!(log.payloads(), vec![0x81]);
        assert_eq!(log.attempts(), vec![0x81, 0xC0]);
        assert!(
            log.events()
                .iter()
                .any(|e| matches!(e, MockEvent::Rejected { key: 4, .. }))
        );
    }
}
