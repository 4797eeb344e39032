//! ARP request frame construction

use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::util::MacAddr;
use pulsescan_core::{Error, Result};
use std::net::Ipv4Addr;

const ETHERNET_HEADER_LEN: usize = 14;
const ARP_PACKET_LEN: usize = 28;

const BROADCAST_MAC: MacAddr = MacAddr(0xff, 0xff, 0xff, 0xff, 0xff, 0xff);

/// Build a broadcast ARP who-has request for `target`
pub fn build_arp_request(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    target: Ipv4Addr,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];

    {
        let mut ethernet = MutableEthernetPacket::new(&mut buffer[..ETHERNET_HEADER_LEN])
            .ok_or_else(|| Error::Network("Ethernet header buffer too small".to_string()))?;
        ethernet.set_destination(BROADCAST_MAC);
        ethernet.set_source(src_mac);
        ethernet.set_ethertype(EtherTypes::Arp);
    }

    {
        let mut arp = MutableArpPacket::new(&mut buffer[ETHERNET_HEADER_LEN..])
            .ok_or_else(|| Error::Network("ARP buffer too small".to_string()))?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Request);
        arp.set_sender_hw_addr(src_mac);
        arp.set_sender_proto_addr(src_ip);
        arp.set_target_hw_addr(MacAddr::zero());
        arp.set_target_proto_addr(target);
    }

    Ok(buffer)
}
