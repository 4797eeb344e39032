//! Network interface selection
//!
//! The sniffer and the ARP emitter share one interface: named in the
//! configuration, or the first usable non-loopback interface. ARP is only
//! meaningful for on-link targets, so the ARP path also needs the
//! interface's own IPv4 address, MAC, and attached networks.

use ipnetwork::IpNetwork;
use pnet::util::MacAddr;
use pnet_datalink::NetworkInterface;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Errors from interface selection
#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("interface not found: {0}")]
    NotFound(String),

    #[error("no usable network interface")]
    NoUsableInterface,

    #[error("interface {0} has no IPv4 address or MAC for ARP")]
    NotArpCapable(String),
}

impl From<InterfaceError> for pulsescan_core::Error {
    fn from(err: InterfaceError) -> Self {
        pulsescan_core::Error::Network(err.to_string())
    }
}

/// Select the interface used for capture and ARP emission
///
/// A configured name must exist; otherwise the first interface that is up
/// and not loopback wins.
pub fn find_capture_interface(name: Option<&str>) -> Result<NetworkInterface, InterfaceError> {
    let interfaces = pnet_datalink::interfaces();

    match name {
        Some(wanted) => interfaces
            .into_iter()
            .find(|iface| iface.name == wanted)
            .ok_or_else(|| InterfaceError::NotFound(wanted.to_string())),
        None => interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback())
            .ok_or(InterfaceError::NoUsableInterface),
    }
}

/// What the ARP emitter needs to know about its interface
#[derive(Debug, Clone)]
pub struct ArpContext {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    networks: Vec<IpNetwork>,
}

impl ArpContext {
    /// Extract ARP parameters from an interface
    pub fn from_interface(iface: &NetworkInterface) -> Result<Self, InterfaceError> {
        let src_mac = iface
            .mac
            .ok_or_else(|| InterfaceError::NotArpCapable(iface.name.clone()))?;
        let src_ip = iface
            .ips
            .iter()
            .find_map(|net| match net.ip() {
                IpAddr::V4(addr) => Some(addr),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| InterfaceError::NotArpCapable(iface.name.clone()))?;

        Ok(Self {
            src_mac,
            src_ip,
            networks: iface.ips.clone(),
        })
    }

    /// Whether a target is on one of the interface's attached networks
    pub fn on_link(&self, target: Ipv4Addr) -> bool {
        self.networks
            .iter()
            .any(|net| net.contains(IpAddr::V4(target)))
    }
}
