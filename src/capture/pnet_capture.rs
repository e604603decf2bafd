//! pnet-based device selection and packet capture.

use std::io;

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};

use super::{CaptureBackend, CaptureOptions, DeviceDescriptor, DeviceSelector, PacketSource};
use crate::domain::RawPacket;
use crate::error::CaptureError;

fn describe(iface: &NetworkInterface) -> DeviceDescriptor {
    DeviceDescriptor {
        name: iface.name.clone(),
        description: iface.description.clone(),
        is_up: iface.is_up(),
        is_loopback: iface.is_loopback(),
        addresses: iface.ips.iter().map(|net| net.ip()).collect(),
    }
}

/// Enumerates interfaces through `pnet::datalink`.
///
/// With a preferred interface name, selection is by name only; otherwise
/// the default first-available policy applies.
#[derive(Debug, Default)]
pub struct PnetDeviceSelector {
    preferred: Option<String>,
}

impl PnetDeviceSelector {
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }
}

impl DeviceSelector for PnetDeviceSelector {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        Ok(datalink::interfaces().iter().map(describe).collect())
    }

    fn select_device(
        &self,
        devices: Vec<DeviceDescriptor>,
    ) -> Result<DeviceDescriptor, CaptureError> {
        match &self.preferred {
            Some(name) => devices
                .into_iter()
                .find(|d| &d.name == name)
                .ok_or_else(|| CaptureError::InterfaceNotFound(name.clone())),
            None => super::first_available(devices),
        }
    }
}

/// Opens live Ethernet captures with `pnet::datalink::channel`.
#[derive(Debug, Default)]
pub struct PnetBackend;

impl PnetBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for PnetBackend {
    fn open(
        &mut self,
        device: &DeviceDescriptor,
        options: &CaptureOptions,
    ) -> Result<Box<dyn PacketSource>, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == device.name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(device.name.clone()))?;

        let config = Config {
            read_buffer_size: options.snaplen,
            read_timeout: Some(options.read_timeout),
            promiscuous: options.promiscuous,
            ..Config::default()
        };

        let rx = match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(CaptureError::ChannelCreation {
                    device: device.name.clone(),
                    reason: "unsupported channel type".to_string(),
                })
            }
            Err(e) => {
                let msg = e.to_string();
                if e.kind() == io::ErrorKind::PermissionDenied
                    || msg.contains("Operation not permitted")
                {
                    return Err(CaptureError::InsufficientPermissions(device.name.clone()));
                }
                return Err(CaptureError::ChannelCreation {
                    device: device.name.clone(),
                    reason: msg,
                });
            }
        };

        Ok(Box::new(PnetSource {
            rx: Some(rx),
            snaplen: options.snaplen,
        }))
    }
}

/// Receiving half of a pnet channel. Dropping the receiver closes the socket.
struct PnetSource {
    rx: Option<Box<dyn DataLinkReceiver>>,
    snaplen: usize,
}

impl PacketSource for PnetSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };

        match rx.next() {
            Ok(frame) => Ok(Some(snapshot(frame, self.snaplen))),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(CaptureError::Read(e)),
        }
    }

    fn close(&mut self) {
        self.rx = None;
    }
}

/// Keep at most `snaplen` bytes of a received frame.
fn snapshot(frame: &[u8], snaplen: usize) -> RawPacket {
    RawPacket::from_ethernet(&frame[..frame.len().min(snaplen)])
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
