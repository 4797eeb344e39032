//! PulseScan engine
//!
//! The concurrent ping/sniff engine behind host liveness discovery. The
//! orchestrator owns a scan's resources and walks it through its phases;
//! the probe emitter crafts and paces outgoing probes on the main thread
//! while the reply sniffer classifies captured frames on its own thread
//! and feeds the restriction tracker, which gates publication to the
//! downstream queue.
//!
//! # Example
//!
//! ```no_run
//! use pulsescan_core::{EngineConfig, TargetSet};
//! use pulsescan_engine::{MemoryQueue, ScanOrchestrator};
//!
//! # fn example() -> pulsescan_core::Result<()> {
//! let config = EngineConfig::default();
//! let targets: TargetSet = ["192.0.2.1".parse().unwrap()].into_iter().collect();
//! let queue = MemoryQueue::new();
//!
//! let summary = ScanOrchestrator::new(config, targets, queue.clone()).run()?;
//! println!("{} alive, {} dead", summary.alive, summary.dead);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod emitter;
pub mod orchestrator;
pub mod queue;
pub mod restrictions;
pub mod sniffer;

pub use classifier::classify_frame;
pub use emitter::{ProbeEmitter, BURST, BURST_TIMEOUT};
pub use orchestrator::{ScanOrchestrator, ScanSummary};
pub use queue::{
    dead_host_message, error_message, FinishLatch, HostQueue, MemoryQueue, QueueMessage,
    FINISH_SIGNAL,
};
pub use restrictions::{RestrictionTracker, ScanReport};
pub use sniffer::SnifferHandle;
