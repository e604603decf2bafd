//! Classification events handed to the publisher.

use std::fmt;
use std::net::IpAddr;

use chrono::Utc;
use serde::Serialize;

use super::packet::RawPacket;
use super::protocol::ProtocolLabel;

/// Whether traffic was addressed to or sent from the capturing host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Resolve direction against the capture device's own addresses.
    ///
    /// Returns `None` for traffic that neither starts nor ends on the host,
    /// which is common in promiscuous mode.
    pub fn resolve(
        source: Option<IpAddr>,
        destination: Option<IpAddr>,
        local: &[IpAddr],
    ) -> Option<Self> {
        let is_local = |ip: Option<IpAddr>| ip.is_some_and(|ip| local.contains(&ip));

        if is_local(destination) {
            Some(Self::Inbound)
        } else if is_local(source) {
            Some(Self::Outbound)
        } else {
            None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "INBOUND"),
            Self::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

/// One classified packet, ready for publication.
///
/// Serializes to the traffic record published in `record` payload mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationEvent {
    pub protocol: ProtocolLabel,
    #[serde(rename = "timestamp")]
    pub captured_at_epoch_millis: i64,
    pub packet_size: usize,
    pub source_ip: Option<IpAddr>,
    pub destination_ip: Option<IpAddr>,
    pub direction: Option<Direction>,
}

impl ClassificationEvent {
    /// Create a bare event with only the label and timestamp.
    pub fn new(protocol: ProtocolLabel, captured_at_epoch_millis: i64) -> Self {
        Self {
            protocol,
            captured_at_epoch_millis,
            packet_size: 0,
            source_ip: None,
            destination_ip: None,
            direction: None,
        }
    }

    /// Create an event for a packet that was just classified.
    pub fn from_packet(packet: &RawPacket, protocol: ProtocolLabel, local: &[IpAddr]) -> Self {
        Self {
            protocol,
            captured_at_epoch_millis: Utc::now().timestamp_millis(),
            packet_size: packet.len(),
            source_ip: packet.source_ip,
            destination_ip: packet.destination_ip,
            direction: Direction::resolve(packet.source_ip, packet.destination_ip, local),
        }
    }

    /// Broker partition key: the protocol label.
    pub fn key(&self) -> &'static str {
        self.protocol.as_str()
    }
}
