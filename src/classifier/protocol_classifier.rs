//! Header-presence protocol classification.

use crate::domain::{ProtocolLabel, RawPacket};

/// Classify a packet by the first header found in priority order.
///
/// Priority is TCP, UDP, IPv4, IPv6. A TCP segment carried over IPv4 is
/// reported as TCP, never as IPv4. Packets with none of these headers are
/// `Unrecognized`.
pub fn classify(packet: &RawPacket) -> ProtocolLabel {
    let headers = &packet.headers;

    if headers.tcp {
        ProtocolLabel::Tcp
    } else if headers.udp {
        ProtocolLabel::Udp
    } else if headers.ipv4 {
        ProtocolLabel::Ipv4
    } else if headers.ipv6 {
        ProtocolLabel::Ipv6
    } else {
        ProtocolLabel::Unrecognized
    }
}
