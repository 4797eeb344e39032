//! Downstream queue seam
//!
//! Responsive hosts are handed to the downstream scanner through a
//! persistent queue addressed by the `db_address`/`ov_maindbid`
//! configuration keys. That store lives outside this crate; the engine
//! talks to it through [`HostQueue`]. Two message shapes go to the main
//! queue (a plain host string and the finish sentinel); formatted status
//! strings go to the auxiliary channel.

use parking_lot::Mutex;
use pulsescan_core::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sentinel value signalling the engine has finished
pub const FINISH_SIGNAL: &str = "finish";

/// Auxiliary message carrying the final dead-host count
pub fn dead_host_message(count: u64) -> String {
    format!("DEADHOST||| ||| ||| |||{}", count)
}

/// Auxiliary message carrying an advisory error text
pub fn error_message(text: &str) -> String {
    format!("ERRMSG||| ||| ||| |||{}", text)
}

/// Destination for discovered hosts and scan status
pub trait HostQueue: Send + Sync {
    /// Publish a responsive host for downstream scanning
    fn push_host(&self, ip: &str) -> Result<()>;

    /// Publish the terminal finish sentinel
    fn push_finish(&self) -> Result<()>;

    /// Publish a formatted status string on the auxiliary channel
    fn push_status(&self, message: &str) -> Result<()>;
}

/// Exactly-once wrapper around the finish sentinel
///
/// The finish signal may be due at two different moments (when the scan cap
/// fills the queue early, and at teardown) and must be attempted on every
/// exit path. The latch publishes on the first `signal()`; if nothing
/// signalled explicitly, the final drop does.
pub struct FinishLatch {
    queue: Arc<dyn HostQueue>,
    fired: AtomicBool,
}

impl FinishLatch {
    pub fn new(queue: Arc<dyn HostQueue>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            fired: AtomicBool::new(false),
        })
    }

    /// Publish the finish sentinel if it has not been published yet
    pub fn signal(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("publishing finish signal");
        if let Err(e) = self.queue.push_finish() {
            warn!("failed to publish finish signal: {}", e);
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for FinishLatch {
    fn drop(&mut self) {
        self.signal();
    }
}

/// A message recorded by [`MemoryQueue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMessage {
    Host(String),
    Finish,
    Status(String),
}

/// In-memory queue for embedding and tests
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<QueueMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every message in publication order
    pub fn messages(&self) -> Vec<QueueMessage> {
        self.messages.lock().clone()
    }

    /// Host messages only, in publication order
    pub fn hosts(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                QueueMessage::Host(ip) => Some(ip.clone()),
                _ => None,
            })
            .collect()
    }

    /// Status messages only, in publication order
    pub fn statuses(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                QueueMessage::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of finish sentinels seen
    pub fn finish_count(&self) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| matches!(m, QueueMessage::Finish))
            .count()
    }
}

impl HostQueue for MemoryQueue {
    fn push_host(&self, ip: &str) -> Result<()> {
        self.messages.lock().push(QueueMessage::Host(ip.to_string()));
        Ok(())
    }

    fn push_finish(&self) -> Result<()> {
        self.messages.lock().push(QueueMessage::Finish);
        Ok(())
    }

    fn push_status(&self, message: &str) -> Result<()> {
        self.messages
            .lock()
            .push(QueueMessage::Status(message.to_string()));
        Ok(())
    }
}
