//! Captured packet representation.

use std::net::IpAddr;

use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::{ExtensionPacket, FragmentPacket, Ipv6Packet};
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::vlan::VlanPacket;
use pnet::packet::Packet;

/// Fixed IPv6 header length, before any extension headers.
const IPV6_HEADER_LEN: usize = 40;

/// 802.1Q plus one outer 802.1ad tag.
const MAX_VLAN_TAGS: usize = 2;

/// Bound on the IPv6 extension header chain.
const MAX_IPV6_EXTENSIONS: usize = 8;

/// Which protocol headers were found in a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFlags {
    pub tcp: bool,
    pub udp: bool,
    pub ipv4: bool,
    pub ipv6: bool,
}

/// A raw network packet captured from the wire.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// The raw frame as captured
    pub data: Vec<u8>,
    /// Header availability per supported protocol family
    pub headers: HeaderFlags,
    /// Network-layer source address, when an IP header is present
    pub source_ip: Option<IpAddr>,
    /// Network-layer destination address, when an IP header is present
    pub destination_ip: Option<IpAddr>,
}

impl RawPacket {
    /// Build a packet with explicit header flags and no addresses.
    pub fn with_headers(data: Vec<u8>, headers: HeaderFlags) -> Self {
        Self {
            data,
            headers,
            source_ip: None,
            destination_ip: None,
        }
    }

    /// Decode an Ethernet frame and record which headers it carries.
    ///
    /// Never fails: truncated or malformed frames simply carry no flags.
    pub fn from_ethernet(data: &[u8]) -> Self {
        let mut packet = Self::with_headers(data.to_vec(), HeaderFlags::default());

        let Some(ethernet) = EthernetPacket::new(data) else {
            return packet;
        };

        let mut ethertype = ethernet.get_ethertype();
        let mut payload = ethernet.payload();

        for _ in 0..MAX_VLAN_TAGS {
            if !is_vlan_tag(ethertype) {
                break;
            }
            let Some(vlan) = VlanPacket::new(payload) else {
                return packet;
            };
            ethertype = vlan.get_ethertype();
            payload = &payload[VlanPacket::minimum_packet_size()..];
        }

        match ethertype {
            EtherTypes::Ipv4 => packet.decode_ipv4(payload),
            EtherTypes::Ipv6 => packet.decode_ipv6(payload),
            _ => {}
        }

        packet
    }

    /// Number of bytes captured for this packet.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn decode_ipv4(&mut self, bytes: &[u8]) {
        let Some(ipv4) = Ipv4Packet::new(bytes) else {
            return;
        };
        let header_len = usize::from(ipv4.get_header_length()) * 4;
        if ipv4.get_version() != 4 || header_len < Ipv4Packet::minimum_packet_size() {
            return;
        }

        self.headers.ipv4 = true;
        self.source_ip = Some(IpAddr::V4(ipv4.get_source()));
        self.destination_ip = Some(IpAddr::V4(ipv4.get_destination()));

        // Later fragments carry payload bytes, not a transport header.
        if ipv4.get_fragment_offset() != 0 {
            return;
        }

        if let Some(transport) = bytes.get(header_len..) {
            self.decode_transport(ipv4.get_next_level_protocol(), transport);
        }
    }

    fn decode_ipv6(&mut self, bytes: &[u8]) {
        let Some(ipv6) = Ipv6Packet::new(bytes) else {
            return;
        };
        if ipv6.get_version() != 6 {
            return;
        }

        self.headers.ipv6 = true;
        self.source_ip = Some(IpAddr::V6(ipv6.get_source()));
        self.destination_ip = Some(IpAddr::V6(ipv6.get_destination()));

        let chain = bytes
            .get(IPV6_HEADER_LEN..)
            .and_then(|rest| skip_ipv6_extensions(ipv6.get_next_header(), rest));
        if let Some((next_header, transport)) = chain {
            self.decode_transport(next_header, transport);
        }
    }

    fn decode_transport(&mut self, protocol: IpNextHeaderProtocol, bytes: &[u8]) {
        if protocol == IpNextHeaderProtocols::Tcp {
            self.headers.tcp = TcpPacket::new(bytes).is_some();
        } else if protocol == IpNextHeaderProtocols::Udp {
            self.headers.udp = UdpPacket::new(bytes).is_some();
        }
    }
}

fn is_vlan_tag(ethertype: EtherType) -> bool {
    ethertype == EtherTypes::Vlan || ethertype == EtherTypes::PBridge || ethertype == EtherTypes::QinQ
}

/// Follow the IPv6 extension header chain up to the upper-layer header.
///
/// Returns `None` for non-first fragments and for truncated or overlong
/// chains, which leaves the packet classified as plain IPv6.
fn skip_ipv6_extensions(
    mut next_header: IpNextHeaderProtocol,
    mut bytes: &[u8],
) -> Option<(IpNextHeaderProtocol, &[u8])> {
    for _ in 0..MAX_IPV6_EXTENSIONS {
        let header_len = match next_header {
            IpNextHeaderProtocols::Hopopt
            | IpNextHeaderProtocols::Ipv6Route
            | IpNextHeaderProtocols::Ipv6Opts => {
                let extension = ExtensionPacket::new(bytes)?;
                next_header = extension.get_next_header();
                (usize::from(extension.get_hdr_ext_len()) + 1) * 8
            }
            IpNextHeaderProtocols::Ipv6Frag => {
                let fragment = FragmentPacket::new(bytes)?;
                if fragment.get_fragment_offset() != 0 {
                    return None;
                }
                next_header = fragment.get_next_header();
                FragmentPacket::minimum_packet_size()
            }
            _ => return Some((next_header, bytes)),
        };
        bytes = bytes.get(header_len..)?;
    }
    None
}
