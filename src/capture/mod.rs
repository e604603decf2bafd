//! Packet capture abstraction.
//!
//! Device selection, the capture backend and the open session are traits
//! so the capture loop can run against pnet in production and against
//! scripted sources in tests.

mod pnet_capture;

#[cfg(test)]
pub(crate) mod mock;

pub use pnet_capture::{PnetBackend, PnetDeviceSelector};

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;

use crate::domain::RawPacket;
use crate::error::CaptureError;

/// Default snapshot length in bytes.
pub const DEFAULT_SNAPLEN: usize = 65536;

/// Default per-read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10_000);

/// A capturable network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub description: String,
    pub is_up: bool,
    pub is_loopback: bool,
    /// Addresses assigned to the device, used to resolve traffic direction
    pub addresses: Vec<IpAddr>,
}

impl DeviceDescriptor {
    /// A device that is up with no addresses.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            is_up: true,
            is_loopback: false,
            addresses: Vec::new(),
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_up { "UP" } else { "DOWN" };
        let ips = if self.addresses.is_empty() {
            "no IP".to_string()
        } else {
            self.addresses
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "{}: {} [{}]", self.name, status, ips)
    }
}

/// Enumerates devices and picks the one to capture on.
pub trait DeviceSelector: Send {
    /// List capturable devices. An empty list is a valid answer here;
    /// the capture loop treats it as fatal.
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Choose one device from the enumeration.
    fn select_device(
        &self,
        devices: Vec<DeviceDescriptor>,
    ) -> Result<DeviceDescriptor, CaptureError> {
        first_available(devices)
    }
}

/// Default selection policy.
///
/// Prefers an up, non-loopback device with an address, then an up
/// non-loopback device, then any up device, then the first one listed.
pub fn first_available(devices: Vec<DeviceDescriptor>) -> Result<DeviceDescriptor, CaptureError> {
    let external = |d: &DeviceDescriptor| d.is_up && !d.is_loopback;
    let index = devices
        .iter()
        .position(|d| external(d) && !d.addresses.is_empty())
        .or_else(|| devices.iter().position(external))
        .or_else(|| devices.iter().position(|d| d.is_up))
        .unwrap_or(0);
    devices
        .into_iter()
        .nth(index)
        .ok_or(CaptureError::NoDevicesFound)
}

/// Parameters for opening a live capture.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Bytes kept per frame. Also sizes the receive buffer, so frames
    /// longer than this are truncated before header detection.
    pub snaplen: usize,
    pub promiscuous: bool,
    pub read_timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            promiscuous: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Opens live captures on a device.
pub trait CaptureBackend: Send {
    fn open(
        &mut self,
        device: &DeviceDescriptor,
        options: &CaptureOptions,
    ) -> Result<Box<dyn PacketSource>, CaptureError>;
}

/// An open, pull-based packet source.
pub trait PacketSource: Send {
    /// Wait up to the read timeout for the next packet.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing to read.
    fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError>;

    /// Release the underlying handle.
    fn close(&mut self);
}

/// One open interface handle, owned by a single capture loop.
///
/// The source is closed exactly once: on `close()` or on drop, whichever
/// comes first.
pub struct CaptureSession {
    device: DeviceDescriptor,
    source: Box<dyn PacketSource>,
    is_open: bool,
    started_at_epoch_millis: i64,
}

impl CaptureSession {
    pub fn new(device: DeviceDescriptor, source: Box<dyn PacketSource>) -> Self {
        Self {
            device,
            source,
            is_open: true,
            started_at_epoch_millis: Utc::now().timestamp_millis(),
        }
    }

    pub fn device_identifier(&self) -> &str {
        &self.device.name
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn started_at_epoch_millis(&self) -> i64 {
        self.started_at_epoch_millis
    }

    /// Read the next packet, or `Ok(None)` on timeout or a closed session.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        if !self.is_open {
            return Ok(None);
        }
        self.source.next_packet()
    }

    pub fn close(&mut self) {
        if self.is_open {
            self.is_open = false;
            self.source.close();
            tracing::debug!(device = %self.device.name, "Capture session closed");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("device", &self.device.name)
            .field("is_open", &self.is_open)
            .field("started_at_epoch_millis", &self.started_at_epoch_millis)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{ScriptedSource, Step};
    use super::*;

    #[test]
    fn test_first_available_prefers_up_device() {
        let mut down = DeviceDescriptor::named("eth0");
        down.is_up = false;
        let up = DeviceDescriptor::named("eth1");

        let chosen = first_available(vec![down, up]).unwrap();
        assert_eq!(chosen.name, "eth1");
    }

    #[test]
    fn test_first_available_skips_loopback() {
        let mut lo = DeviceDescriptor::named("lo");
        lo.is_loopback = true;
        lo.addresses = vec![IpAddr::from([127, 0, 0, 1])];
        let mut docker = DeviceDescriptor::named("docker0");
        docker.addresses.clear();
        let mut eth0 = DeviceDescriptor::named("eth0");
        eth0.addresses = vec![IpAddr::from([192, 168, 1, 10])];

        let chosen = first_available(vec![lo.clone(), docker, eth0]).unwrap();
        assert_eq!(chosen.name, "eth0");

        let chosen = first_available(vec![lo, DeviceDescriptor::named("eth1")]).unwrap();
        assert_eq!(chosen.name, "eth1");
    }

    #[test]
    fn test_first_available_loopback_when_only_up_device() {
        let mut lo = DeviceDescriptor::named("lo");
        lo.is_loopback = true;
        let mut down = DeviceDescriptor::named("eth0");
        down.is_up = false;

        assert_eq!(first_available(vec![down, lo]).unwrap().name, "lo");
    }

    #[test]
    fn test_first_available_falls_back_to_first() {
        let mut a = DeviceDescriptor::named("a");
        a.is_up = false;
        let mut b = DeviceDescriptor::named("b");
        b.is_up = false;

        assert_eq!(first_available(vec![a, b]).unwrap().name, "a");
    }

    #[test]
    fn test_first_available_empty() {
        assert!(matches!(first_available(Vec::new()), Err(CaptureError::NoDevicesFound)));
    }

    #[test]
    fn test_session_closes_once() {
        let (source, probe) = ScriptedSource::new(vec![Step::Timeout]);
        let mut session = CaptureSession::new(DeviceDescriptor::named("eth0"), Box::new(source));

        assert!(session.is_open());
        session.close();
        session.close();
        drop(session);

        assert_eq!(probe.close_count(), 1);
    }

    #[test]
    fn test_session_closes_on_drop() {
        let (source, probe) = ScriptedSource::new(Vec::new());
        let session = CaptureSession::new(DeviceDescriptor::named("eth0"), Box::new(source));
        drop(session);

        assert_eq!(probe.close_count(), 1);
    }

    #[test]
    fn test_closed_session_reads_nothing() {
        let (source, probe) = ScriptedSource::new(vec![Step::Packet(Vec::new())]);
        let mut session = CaptureSession::new(DeviceDescriptor::named("eth0"), Box::new(source));
        session.close();

        assert!(session.next_packet().unwrap().is_none());
        assert_eq!(probe.read_count(), 0);
    }

    #[test]
    fn test_descriptor_display() {
        let mut device = DeviceDescriptor::named("eth0");
        assert_eq!(device.to_string(), "eth0: UP [no IP]");

        device.addresses.push("192.168.1.10".parse().unwrap());
        device.is_up = false;
        assert_eq!(device.to_string(), "eth0: DOWN [192.168.1.10]");
    }
}
