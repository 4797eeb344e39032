//! Link-layer reply capture
//!
//! The sniffer needs three properties from its capture primitive: a
//! per-poll timeout (so a stop request is honoured within one poll), the
//! ability to observe every reply family we solicit (IPv4/IPv6/ARP), and a
//! clean close. The trait keeps the engine testable: integration tests
//! drive the sniffer with a scripted implementation instead of a live
//! device.

use pulsescan_core::Result;

/// Poll timeout of the capture loop; bounds stop-request latency
pub const POLL_TIMEOUT_MS: u64 = 100;

/// Snapshot length: liveness replies fit a single Ethernet frame
pub const SNAPSHOT_LEN: usize = 1500;

/// Capture handle for the reply sniffer
pub trait ReplyCapture: Send {
    /// Open the capture device
    ///
    /// `interface` of `None` auto-detects the first usable non-loopback
    /// interface. The device is opened non-promiscuous.
    fn open(&mut self, interface: Option<&str>) -> Result<()>;

    /// Fetch the next frame, waiting at most `timeout_ms`
    ///
    /// Returns `Ok(None)` when the timeout elapses without traffic.
    fn next_frame(&mut self, timeout_ms: u64) -> Result<Option<Vec<u8>>>;

    /// Close the capture device
    fn close(&mut self) -> Result<()>;
}

/// Create the platform capture implementation
pub fn create_capture() -> Result<Box<dyn ReplyCapture>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::DatalinkCapture::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(pulsescan_core::Error::Network(
            "packet capture is only supported on Linux".to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux::DatalinkCapture;
