//! Configuration for the discovery engine
//!
//! Configuration arrives either as a TOML document or as the flat
//! string-keyed preference map the surrounding scanner passes down
//! (`db_address`, `ov_maindbid`, `max_scan_hosts`, `max_alive_hosts`,
//! `port_range`, alive-test selector). All preference values are strings;
//! numeric ones are decimal integers.

use crate::error::{Error, Result};
use crate::types::{AliveTestMethods, PortRange};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Quota value meaning "no limit"
pub const UNLIMITED_HOSTS: u64 = u64::MAX;

/// TCP destination ports probed when no port range is configured
///
/// Chosen to maximise the chance of a response from typical hosts.
pub const DEFAULT_TCP_PROBE_PORTS: [u16; 5] = [80, 137, 587, 3128, 8081];

/// Default source port for TCP probes; replies are matched on it
pub const DEFAULT_TCP_PROBE_SOURCE_PORT: u16 = 50053;

/// Downstream queue addressing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Connection string of the persistent queue (`db_address`)
    pub address: String,
    /// Database id within the queue store (`ov_maindbid`)
    pub db_id: u32,
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Downstream queue addressing, passed through to the queue backend
    #[serde(default)]
    pub queue: QueueConfig,
    /// Upper bound on hosts published for downstream scanning
    #[serde(default = "unlimited")]
    pub max_scan_hosts: u64,
    /// Upper bound on alive hosts to identify before halting emission
    #[serde(default = "unlimited")]
    pub max_alive_hosts: u64,
    /// TCP destination ports; `None` selects the built-in probe list
    #[serde(default)]
    pub port_range: Option<PortRange>,
    /// Selected liveness methods
    #[serde(default = "default_methods")]
    pub methods: AliveTestMethods,
    /// Capture/ARP interface (None = auto-detect first suitable)
    #[serde(default)]
    pub interface: Option<String>,
    /// Source port TCP probes originate from; the reply filter matches on it
    #[serde(default = "default_probe_port")]
    pub tcp_probe_port: u16,
    /// Engine timing knobs
    #[serde(default)]
    pub timing: EngineTiming,
}

fn unlimited() -> u64 {
    UNLIMITED_HOSTS
}

fn default_methods() -> AliveTestMethods {
    AliveTestMethods::ICMP
        .combine(AliveTestMethods::TCP_ACK)
        .combine(AliveTestMethods::ARP)
}

fn default_probe_port() -> u16 {
    DEFAULT_TCP_PROBE_SOURCE_PORT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            max_scan_hosts: UNLIMITED_HOSTS,
            max_alive_hosts: UNLIMITED_HOSTS,
            port_range: None,
            methods: default_methods(),
            interface: None,
            tcp_probe_port: DEFAULT_TCP_PROBE_SOURCE_PORT,
            timing: EngineTiming::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML string
    pub fn load_from_str(contents: &str) -> Result<Self> {
        let mut config: EngineConfig = toml::from_str(contents)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the scanner's flat preference map
    ///
    /// Unknown keys are ignored (other subsystems share the map). A quota
    /// of `0` or an absent quota means unlimited.
    pub fn from_prefs(prefs: &HashMap<String, String>) -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(address) = prefs.get("db_address") {
            config.queue.address = address.clone();
        }
        if let Some(db_id) = prefs.get("ov_maindbid") {
            config.queue.db_id = db_id
                .trim()
                .parse()
                .map_err(|_| Error::Parse(format!("invalid ov_maindbid: {}", db_id)))?;
        }
        if let Some(value) = prefs.get("max_scan_hosts") {
            config.max_scan_hosts = parse_quota("max_scan_hosts", value)?;
        }
        if let Some(value) = prefs.get("max_alive_hosts") {
            config.max_alive_hosts = parse_quota("max_alive_hosts", value)?;
        }
        if let Some(value) = prefs.get("port_range") {
            config.port_range = Some(PortRange::parse(value)?);
        }
        if let Some(value) = prefs.get("alive_test") {
            config.methods = AliveTestMethods::parse(value)?;
        }
        if let Some(value) = prefs.get("interface") {
            config.interface = Some(value.clone());
        }
        if let Some(value) = prefs.get("tcp_probe_port") {
            config.tcp_probe_port = value
                .trim()
                .parse()
                .map_err(|_| Error::Parse(format!("invalid tcp_probe_port: {}", value)))?;
        }

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Raise the alive cap to the scan cap when it is smaller
    ///
    /// Publishing is bounded by the scan cap, so identifying fewer alive
    /// hosts than may be published would starve the downstream scanner.
    /// An unlimited scan cap leaves a configured alive cap untouched,
    /// since raising to infinity would erase it.
    pub fn normalize(&mut self) {
        if self.max_scan_hosts != UNLIMITED_HOSTS && self.max_alive_hosts < self.max_scan_hosts {
            self.max_alive_hosts = self.max_scan_hosts;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            return Err(Error::Config(
                "no alive-test method selected".to_string(),
            ));
        }
        if self.tcp_probe_port == 0 {
            return Err(Error::Config("tcp_probe_port must not be 0".to_string()));
        }
        if let Some(ref range) = self.port_range {
            if range.count() == 0 {
                return Err(Error::Config("port_range is empty".to_string()));
            }
        }
        Ok(())
    }

    /// TCP destination ports to probe
    ///
    /// Falls back to the built-in list when no port range is configured.
    pub fn tcp_ports(&self) -> Vec<u16> {
        match self.port_range {
            Some(ref range) => range.iter().collect(),
            None => DEFAULT_TCP_PROBE_PORTS.to_vec(),
        }
    }
}

fn parse_quota(key: &str, value: &str) -> Result<u64> {
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Parse(format!("invalid {}: {}", key, value)))?;
    if parsed == 0 {
        Ok(UNLIMITED_HOSTS)
    } else {
        Ok(parsed)
    }
}

/// Engine timing knobs
///
/// Defaults match the production cadence; tests shrink them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTiming {
    /// Pause after the sniffer signals readiness, before the first probe
    pub settle_ms: u64,
    /// How long to keep collecting late replies after the last probe
    pub drain_ms: u64,
    /// Grace period between requesting the sniffer break and cancelling it
    pub stop_grace_ms: u64,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            settle_ms: 2_000,
            drain_ms: 10_000,
            stop_grace_ms: 2_000,
        }
    }
}

impl EngineTiming {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
