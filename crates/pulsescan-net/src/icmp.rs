//! ICMPv4 echo request construction

use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};
use pnet::packet::Packet;
use pulsescan_core::{Error, Result};
use rand::Rng;

const ECHO_PAYLOAD: &[u8] = b"pulsescan";

/// Build an ICMPv4 echo request with a random identifier and sequence
///
/// The kernel supplies the IPv4 header on the raw ICMP socket, so only the
/// ICMP portion is built here.
pub fn build_echo_request() -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let mut buffer =
        vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + ECHO_PAYLOAD.len()];

    let mut echo = MutableEchoRequestPacket::new(&mut buffer)
        .ok_or_else(|| Error::Network("echo request buffer too small".to_string()))?;
    echo.set_icmp_type(IcmpTypes::EchoRequest);
    echo.set_icmp_code(IcmpCode(0));
    echo.set_identifier(rng.gen());
    echo.set_sequence_number(rng.gen());
    echo.set_payload(ECHO_PAYLOAD);

    let checksum = pnet::util::checksum(echo.packet(), 1);
    echo.set_checksum(checksum);

    Ok(buffer)
}
