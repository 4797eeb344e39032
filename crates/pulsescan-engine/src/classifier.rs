//! Reply classification
//!
//! In-code equivalent of the capture filter
//!
//! ```text
//! (ip6 or ip or arp) and
//! (ip6[40]=129 or icmp[icmptype]=icmp-echoreply or
//!  dst port <probe port> or arp[6:2]=2)
//! ```
//!
//! A frame either yields the address that proved a host alive or nothing.
//! Offsets are never hard-coded: frames are parsed as structured Ethernet /
//! IP / ARP packets, so the layout follows the link type.

use pnet::packet::arp::{ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::Packet;
use std::net::IpAddr;

/// ICMPv6 Echo Reply
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Extract the replying host from a captured frame, if it matches
///
/// Accepted frames: IPv4 ICMP echo replies, ICMPv6 echo replies, TCP
/// responses addressed to our probe source port, and ARP replies. The
/// returned address is the IP source (or the ARP sender protocol address).
pub fn classify_frame(frame: &[u8], tcp_probe_port: u16) -> Option<IpAddr> {
    let ethernet = EthernetPacket::new(frame)?;

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => classify_ipv4(ethernet.payload(), tcp_probe_port),
        EtherTypes::Ipv6 => classify_ipv6(ethernet.payload(), tcp_probe_port),
        EtherTypes::Arp => classify_arp(ethernet.payload()),
        _ => None,
    }
}

fn classify_ipv4(payload: &[u8], tcp_probe_port: u16) -> Option<IpAddr> {
    let ip = Ipv4Packet::new(payload)?;
    let source = ip.get_source();

    match ip.get_next_level_protocol() {
        IpNextHeaderProtocols::Icmp => {
            let icmp = IcmpPacket::new(ip.payload())?;
            if icmp.get_icmp_type() == IcmpTypes::EchoReply {
                Some(IpAddr::V4(source))
            } else {
                None
            }
        }
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(ip.payload())?;
            if tcp.get_destination() == tcp_probe_port {
                Some(IpAddr::V4(source))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn classify_ipv6(payload: &[u8], tcp_probe_port: u16) -> Option<IpAddr> {
    let ip = Ipv6Packet::new(payload)?;
    let source = ip.get_source();

    match ip.get_next_header() {
        IpNextHeaderProtocols::Icmpv6 => {
            // first octet past the fixed header is the ICMPv6 type
            if ip.payload().first() == Some(&ICMPV6_ECHO_REPLY) {
                Some(IpAddr::V6(source))
            } else {
                None
            }
        }
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(ip.payload())?;
            if tcp.get_destination() == tcp_probe_port {
                Some(IpAddr::V6(source))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn classify_arp(payload: &[u8]) -> Option<IpAddr> {
    let arp = ArpPacket::new(payload)?;
    if arp.get_operation() == ArpOperations::Reply {
        Some(IpAddr::V4(arp.get_sender_proto_addr()))
    } else {
        None
    }
}
