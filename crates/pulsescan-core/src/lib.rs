//! PulseScan core library
//!
//! Shared foundation for the host liveness discovery engine: the error
//! type, engine configuration, and the target/selector/port types the
//! network and engine crates build on.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    EngineConfig, EngineTiming, QueueConfig, DEFAULT_TCP_PROBE_PORTS,
    DEFAULT_TCP_PROBE_SOURCE_PORT, UNLIMITED_HOSTS,
};
pub use error::{Error, Result};
pub use types::{canonical_ip, AliveTestMethods, PortRange, Target, TargetSet};
