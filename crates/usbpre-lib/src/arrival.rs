//! Arrival detector — matching devices present at startup, then every hot-plug.
//!
//! [`subscribe`] registers the hot-plug watch before enumerating the bus, so a
//! device plugged in between the two calls is never missed. The resulting
//! [`Arrivals`] iterator first yields the snapshot ("priming"), then one item
//! per matching arrival, blocking between events. It only ends if the event
//! source does.

use std::collections::HashSet;
use std::time::Duration;

use crate::device::{DeviceError, DeviceRef, Result, UsbDeviceRef};
use crate::protocol::DeviceIdentity;

/// Raw presence change reported by the host.
#[derive(Debug)]
pub enum PresenceEvent<D: DeviceRef> {
    Arrived(D),
    Left(D::Key),
}

/// Lazy, non-restartable sequence of matching device references.
pub struct Arrivals<D: DeviceRef, E> {
    identity: DeviceIdentity,
    snapshot: std::vec::IntoIter<D>,
    events: E,
    /// Keys yielded from the snapshot that the watch may report again.
    primed: HashSet<D::Key>,
}

impl<D, E> Arrivals<D, E>
where
    D: DeviceRef,
    E: Iterator<Item = PresenceEvent<D>>,
{
    pub fn new(identity: DeviceIdentity, snapshot: Vec<D>, events: E) -> Self {
        Self {
            identity,
            snapshot: snapshot.into_iter(),
            events,
            primed: HashSet::new(),
        }
    }
}

impl<D, E> Iterator for Arrivals<D, E>
where
    D: DeviceRef,
    E: Iterator<Item = PresenceEvent<D>>,
{
    type Item = D;

    fn next(&mut self) -> Option<D> {
        for dev in self.snapshot.by_ref() {
            if dev.matches(&self.identity) {
                log::info!("device already present at {}", dev.location());
                self.primed.insert(dev.key());
                return Some(dev);
            }
        }

        for event in self.events.by_ref() {
            match event {
                PresenceEvent::Arrived(dev) => {
                    if !dev.matches(&self.identity) {
                        continue;
                    }
                    if self.primed.remove(&dev.key()) {
                        log::debug!("{} already handled at startup", dev.location());
                        continue;
                    }
                    log::info!("device arrival detected at {}", dev.location());
                    return Some(dev);
                }
                PresenceEvent::Left(key) => {
                    if self.primed.remove(&key) {
                        log::debug!("device {key:?} removed");
                    }
                }
            }
        }
        None
    }
}

// ── nusb event source ──

/// Blocking adapter over nusb's asynchronous hot-plug stream.
pub struct UsbPresenceEvents {
    watch: futures_lite::stream::BlockOn<nusb::hotplug::HotplugWatch>,
    timeout: Duration,
}

impl Iterator for UsbPresenceEvents {
    type Item = PresenceEvent<UsbDeviceRef>;

    fn next(&mut self) -> Option<Self::Item> {
        use nusb::hotplug::HotplugEvent;

        let event = match self.watch.next()? {
            HotplugEvent::Connected(info) => {
                PresenceEvent::Arrived(UsbDeviceRef::new(info).with_timeout(self.timeout))
            }
            HotplugEvent::Disconnected(id) => PresenceEvent::Left(id),
        };
        Some(event)
    }
}

pub type UsbArrivals = Arrivals<UsbDeviceRef, UsbPresenceEvents>;

/// Subscribe to arrivals of devices matching `identity`.
///
/// Handles opened from yielded references use `timeout` per transfer.
/// Failure here means the host cannot report arrivals at all.
pub fn subscribe(identity: DeviceIdentity, timeout: Duration) -> Result<UsbArrivals> {
    let watch = nusb::watch_devices()
        .map_err(|e| DeviceError::SubscribeFailed(format!("hotplug watch: {e}")))?;

    let snapshot = nusb::list_devices()
        .map_err(|e| DeviceError::SubscribeFailed(format!("USB enumeration: {e}")))?
        .filter(|info| identity.matches(info.vendor_id(), info.product_id()))
        .map(|info| UsbDeviceRef::new(info).with_timeout(timeout))
        .collect();

    let events = UsbPresenceEvents {
        watch: futures_lite::stream::block_on(watch),
        timeout,
    };
    Ok(Arrivals::new(identity, snapshot, events))
}
