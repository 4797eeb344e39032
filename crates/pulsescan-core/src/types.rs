//! Core types for host liveness discovery
//!
//! The target set is built once from the upstream target-list parser and is
//! immutable for the lifetime of a scan. Targets are keyed by their canonical
//! string form; IPv4-mapped IPv6 input collapses onto the plain IPv4 target
//! so that a reply seen on either form deduplicates correctly.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Liveness probe methods as a bitmask
///
/// The numbering matches the decimal selector accepted through the
/// preference interface, so a stored selector round-trips unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveTestMethods(pub u8);

impl AliveTestMethods {
    /// TCP probe with the ACK flag
    pub const TCP_ACK: AliveTestMethods = AliveTestMethods(0b0000_0001);
    /// ICMP echo request (v4 and v6)
    pub const ICMP: AliveTestMethods = AliveTestMethods(0b0000_0010);
    /// ARP request / IPv6 Neighbor Solicitation
    pub const ARP: AliveTestMethods = AliveTestMethods(0b0000_0100);
    /// Skip probing entirely and treat every target as alive
    pub const CONSIDER_ALIVE: AliveTestMethods = AliveTestMethods(0b0000_1000);
    /// TCP probe with the SYN flag
    pub const TCP_SYN: AliveTestMethods = AliveTestMethods(0b0001_0000);

    /// Create a selector with no methods set
    pub const fn empty() -> Self {
        AliveTestMethods(0)
    }

    /// Combine two selectors
    pub fn combine(&self, other: AliveTestMethods) -> Self {
        AliveTestMethods(self.0 | other.0)
    }

    /// Check whether a method is selected
    pub fn has(&self, method: AliveTestMethods) -> bool {
        (self.0 & method.0) != 0
    }

    /// Check whether no method is selected
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check whether any packet-sending method is selected
    ///
    /// Consider-alive marks hosts without touching the network, so a
    /// selector consisting only of it needs neither sockets nor a sniffer.
    pub fn any_probing(&self) -> bool {
        !self.has(Self::CONSIDER_ALIVE) && self.0 != 0
    }

    /// Parse the decimal selector string from the preference interface
    pub fn parse(input: &str) -> Result<Self> {
        let bits: u8 = input
            .trim()
            .parse()
            .map_err(|_| Error::Parse(format!("invalid alive-test selector: {}", input)))?;
        const ALL: u8 = 0b0001_1111;
        if bits & !ALL != 0 {
            return Err(Error::Parse(format!(
                "unknown alive-test bits in selector: {}",
                input
            )));
        }
        Ok(AliveTestMethods(bits))
    }
}

impl fmt::Display for AliveTestMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.has(Self::TCP_ACK) {
            names.push("TCP-ACK");
        }
        if self.has(Self::ICMP) {
            names.push("ICMP");
        }
        if self.has(Self::ARP) {
            names.push("ARP");
        }
        if self.has(Self::CONSIDER_ALIVE) {
            names.push("Consider-Alive");
        }
        if self.has(Self::TCP_SYN) {
            names.push("TCP-SYN");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Normalise an address to its canonical probe form
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) collapse to plain IPv4;
/// everything else is returned unchanged. The upstream target list hands
/// IPv4 hosts over in mapped form.
pub fn canonical_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// A single scan target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    addr: IpAddr,
    canonical: String,
}

impl Target {
    /// Create a target from an address, normalising IPv4-mapped input
    pub fn new(addr: IpAddr) -> Self {
        let addr = canonical_ip(addr);
        Self {
            canonical: addr.to_string(),
            addr,
        }
    }

    /// Parse a target from its string form
    pub fn parse(input: &str) -> Result<Self> {
        let addr: IpAddr = input
            .trim()
            .parse()
            .map_err(|_| Error::InvalidTarget(input.to_string()))?;
        Ok(Self::new(addr))
    }

    /// The normalised address
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The canonical string form (key into the target set)
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

/// The immutable set of hosts whose liveness is to be determined
///
/// Keyed by canonical IP string, iterated in insertion order so probe
/// emission and consider-alive publication are deterministic.
#[derive(Debug, Default, Clone)]
pub struct TargetSet {
    order: Vec<Target>,
    index: HashMap<String, usize>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a target; duplicates (after normalisation) are ignored
    pub fn insert(&mut self, target: Target) {
        if !self.index.contains_key(target.canonical()) {
            self.index
                .insert(target.canonical().to_string(), self.order.len());
            self.order.push(target);
        }
    }

    /// Membership test by canonical string
    pub fn contains(&self, canonical: &str) -> bool {
        self.index.contains_key(canonical)
    }

    /// Look up a target by canonical string
    pub fn get(&self, canonical: &str) -> Option<&Target> {
        self.index.get(canonical).map(|&i| &self.order[i])
    }

    /// Iterate targets in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<IpAddr> for TargetSet {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        let mut set = TargetSet::new();
        for addr in iter {
            set.insert(Target::new(addr));
        }
        set
    }
}

/// Parsed TCP port specification: "80", "1-1000", "80,443,8080-8090"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    segments: Vec<(u16, u16)>,
}

impl PortRange {
    /// Parse a comma-separated list of ports and inclusive ranges
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(Error::InvalidPortRange(
                "empty port specification".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            let (start, end) = match part.split_once('-') {
                Some((lo, hi)) => (Self::parse_port(lo)?, Self::parse_port(hi)?),
                None => {
                    let p = Self::parse_port(part)?;
                    (p, p)
                }
            };
            if end < start {
                return Err(Error::InvalidPortRange(format!(
                    "end port {} < start port {}",
                    end, start
                )));
            }
            segments.push((start, end));
        }
        Ok(Self { segments })
    }

    fn parse_port(input: &str) -> Result<u16> {
        let port: u16 = input
            .trim()
            .parse()
            .map_err(|_| Error::InvalidPortRange(format!("invalid port number: {}", input)))?;
        if port == 0 {
            return Err(Error::InvalidPortRange("port 0 is invalid".to_string()));
        }
        Ok(port)
    }

    /// Iterate every port in the specification, in order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.segments.iter().flat_map(|&(start, end)| start..=end)
    }

    /// Total number of ports
    pub fn count(&self) -> usize {
        self.segments
            .iter()
            .map(|&(start, end)| end as usize - start as usize + 1)
            .sum()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|&(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{}-{}", start, end)
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}
