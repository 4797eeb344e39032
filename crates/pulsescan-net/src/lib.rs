//! PulseScan network layer
//!
//! Raw-socket plumbing for the discovery engine: privilege preflight,
//! interface selection, the per-method socket factory, packet builders for
//! every probe family (ICMPv4/v6 echo, TCP SYN/ACK, ARP, IPv6 Neighbor
//! Solicitation), and the link-layer capture abstraction the reply sniffer
//! runs on.

pub mod arp;
pub mod capture;
pub mod icmp;
pub mod icmpv6;
pub mod interface;
pub mod privilege;
pub mod sockets;
pub mod tcp;

pub use capture::{create_capture, ReplyCapture, POLL_TIMEOUT_MS, SNAPSHOT_LEN};
pub use interface::{find_capture_interface, ArpContext, InterfaceError};
pub use privilege::{check_privileges, has_raw_socket_capability};
pub use sockets::{ProbeSockets, SocketKind};
pub use tcp::TcpProbeKind;
