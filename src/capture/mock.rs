//! Scripted capture doubles for tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CaptureBackend, CaptureOptions, DeviceDescriptor, DeviceSelector, PacketSource};
use crate::domain::RawPacket;
use crate::error::CaptureError;

/// One scripted result of `next_packet`.
#[derive(Debug, Clone)]
pub enum Step {
    Packet(Vec<u8>),
    Timeout,
    Fail,
    /// The driver crashes inside the read.
    Panic,
}

/// Counters shared between a scripted source and the test.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Plays back a fixed script, then times out forever.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    probe: SourceProbe,
    idle: Duration,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        let source = Self {
            steps: steps.into(),
            probe: probe.clone(),
            idle: Duration::from_millis(5),
        };
        (source, probe)
    }
}

impl PacketSource for ScriptedSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Packet(frame)) => Ok(Some(RawPacket::from_ethernet(&frame))),
            Some(Step::Fail) => Err(CaptureError::Read(io::Error::new(
                io::ErrorKind::Other,
                "device went away",
            ))),
            Some(Step::Panic) => panic!("capture driver crashed"),
            Some(Step::Timeout) | None => {
                std::thread::sleep(self.idle);
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Backend that hands out one scripted source, or fails to open.
pub struct ScriptedBackend {
    source: Option<ScriptedSource>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(source: ScriptedSource) -> (Self, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let backend = Self {
            source: Some(source),
            opens: opens.clone(),
        };
        (backend, opens)
    }

    pub fn failing() -> (Self, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let backend = Self {
            source: None,
            opens: opens.clone(),
        };
        (backend, opens)
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(
        &mut self,
        device: &DeviceDescriptor,
        _options: &CaptureOptions,
    ) -> Result<Box<dyn PacketSource>, CaptureError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.source.take() {
            Some(source) => Ok(Box::new(source)),
            None => Err(CaptureError::InsufficientPermissions(device.name.clone())),
        }
    }
}

/// Selector over a fixed device list.
pub struct StaticSelector {
    devices: Result<Vec<DeviceDescriptor>, String>,
}

impl StaticSelector {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices: Ok(devices) }
    }

    pub fn single(name: &str) -> Self {
        Self::new(vec![DeviceDescriptor::named(name)])
    }

    pub fn broken(reason: &str) -> Self {
        Self {
            devices: Err(reason.to_string()),
        }
    }
}

impl DeviceSelector for StaticSelector {
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CaptureError> {
        self.devices.clone().map_err(CaptureError::Enumeration)
    }
}
