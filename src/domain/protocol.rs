//! Protocol labels.

use std::fmt;

use serde::Serialize;

/// The protocol family a captured packet is reported as.
///
/// Every packet maps to exactly one label; `Unrecognized` is a valid
/// outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolLabel {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "IPv4")]
    Ipv4,
    #[serde(rename = "IPv6")]
    Ipv6,
    #[serde(rename = "unknown")]
    Unrecognized,
}

impl ProtocolLabel {
    /// Wire form used as the broker key and value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
            Self::Unrecognized => "unknown",
        }
    }

    /// Whether events with this label are forwarded to the broker.
    pub fn is_publishable(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

impl fmt::Display for ProtocolLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
