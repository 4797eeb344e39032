//! ICMPv6 echo request and Neighbor Solicitation construction
//!
//! Neighbor Solicitation stands in for ARP on IPv6 networks; the probe is
//! addressed to the target's solicited-node multicast group. Checksums are
//! computed over the 40-byte IPv6 pseudo-header (the kernel recomputes them
//! on IPPROTO_ICMPV6 raw sockets, but a well-formed packet keeps the
//! builders testable without a socket).

use pnet::packet::icmpv6::{Icmpv6Code, Icmpv6Type, MutableIcmpv6Packet};
use pnet::packet::MutablePacket;
use pulsescan_core::{Error, Result};
use rand::Rng;
use std::net::Ipv6Addr;

/// ICMPv6 Echo Request
const TYPE_ECHO_REQUEST: u8 = 128;
/// ICMPv6 Neighbor Solicitation
const TYPE_NEIGHBOR_SOLICITATION: u8 = 135;
/// Next-header value for ICMPv6 in the pseudo-header
const NEXT_HEADER_ICMPV6: u8 = 58;

/// Build an ICMPv6 echo request with a random identifier and sequence
pub fn build_echo_request(src: Ipv6Addr, dst: Ipv6Addr) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let identifier: u16 = rng.gen();
    let sequence: u16 = rng.gen();

    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&identifier.to_be_bytes());
    payload.extend_from_slice(&sequence.to_be_bytes());

    build(TYPE_ECHO_REQUEST, payload, src, dst)
}

/// Build a Neighbor Solicitation for `target`
///
/// Includes a source link-layer address option when a MAC is known.
pub fn build_neighbor_solicitation(
    target: Ipv6Addr,
    source_ll_addr: Option<[u8; 6]>,
    src: Ipv6Addr,
) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(28);
    // Reserved
    payload.extend_from_slice(&[0, 0, 0, 0]);
    // Target address
    payload.extend_from_slice(&target.octets());
    if let Some(ll_addr) = source_ll_addr {
        payload.push(1); // option: source link-layer address
        payload.push(1); // length in units of 8 octets
        payload.extend_from_slice(&ll_addr);
    }

    build(
        TYPE_NEIGHBOR_SOLICITATION,
        payload,
        src,
        solicited_node_multicast(target),
    )
}

/// Solicited-node multicast group for an address: ff02::1:ff00:0/104
/// combined with the target's low 24 bits
pub fn solicited_node_multicast(target: Ipv6Addr) -> Ipv6Addr {
    let segments = target.segments();
    Ipv6Addr::new(
        0xff02,
        0,
        0,
        0,
        0,
        1,
        0xff00 | (segments[6] & 0x00ff),
        segments[7],
    )
}

fn build(icmp_type: u8, payload: Vec<u8>, src: Ipv6Addr, dst: Ipv6Addr) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; 8 + payload.len()];

    {
        let mut packet = MutableIcmpv6Packet::new(&mut buffer)
            .ok_or_else(|| Error::Network("ICMPv6 buffer too small".to_string()))?;
        packet.set_icmpv6_type(Icmpv6Type::new(icmp_type));
        packet.set_icmpv6_code(Icmpv6Code(0));
        packet.set_checksum(0);
        let slot = packet.payload_mut();
        slot[..payload.len()].copy_from_slice(&payload);
    }

    let checksum = pseudo_header_checksum(&buffer, src, dst);
    buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
    Ok(buffer)
}

/// Checksum over {src, dst, upper-layer length, zero, next-header} + packet
fn pseudo_header_checksum(packet: &[u8], src: Ipv6Addr, dst: Ipv6Addr) -> u16 {
    let mut data = Vec::with_capacity(40 + packet.len());
    data.extend_from_slice(&src.octets());
    data.extend_from_slice(&dst.octets());
    data.extend_from_slice(&(packet.len() as u32).to_be_bytes());
    data.extend_from_slice(&[0, 0, 0]);
    data.push(NEXT_HEADER_ICMPV6);
    data.extend_from_slice(packet);
    pnet::util::checksum(&data, 21)
}
