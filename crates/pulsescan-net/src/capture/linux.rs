//! Linux capture implementation over AF_PACKET

use super::{ReplyCapture, POLL_TIMEOUT_MS, SNAPSHOT_LEN};
use crate::interface::find_capture_interface;
use pnet_datalink::{self, Channel, Config, DataLinkReceiver};
use pulsescan_core::{Error, Result};
use std::io::ErrorKind;
use std::time::Duration;

/// AF_PACKET capture with a bounded per-poll read timeout
pub struct DatalinkCapture {
    rx: Option<Box<dyn DataLinkReceiver>>,
    interface_name: Option<String>,
}

impl DatalinkCapture {
    pub fn new() -> Self {
        Self {
            rx: None,
            interface_name: None,
        }
    }
}

impl Default for DatalinkCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyCapture for DatalinkCapture {
    fn open(&mut self, interface: Option<&str>) -> Result<()> {
        let iface = find_capture_interface(interface)?;

        let config = Config {
            read_timeout: Some(Duration::from_millis(POLL_TIMEOUT_MS)),
            read_buffer_size: SNAPSHOT_LEN * 4,
            promiscuous: false,
            ..Default::default()
        };

        let rx = match pnet_datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(Error::Network(
                    "unsupported channel type (expected Ethernet)".to_string(),
                ))
            }
            Err(e) => {
                return Err(Error::Network(format!(
                    "cannot open capture on {}: {}",
                    iface.name, e
                )))
            }
        };

        tracing::debug!("capture open on {}", iface.name);
        self.interface_name = Some(iface.name);
        self.rx = Some(rx);
        Ok(())
    }

    fn next_frame(&mut self, timeout_ms: u64) -> Result<Option<Vec<u8>>> {
        let rx = self
            .rx
            .as_mut()
            .ok_or_else(|| Error::Network("capture not open".to_string()))?;

        // the channel's own read timeout bounds each next() call
        let polls = timeout_ms.div_ceil(POLL_TIMEOUT_MS).max(1);
        for _ in 0..polls {
            match rx.next() {
                Ok(frame) => return Ok(Some(frame.to_vec())),
                Err(e) => match e.kind() {
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
                        continue
                    }
                    _ => return Err(Error::Network(format!("capture read failed: {}", e))),
                },
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.rx = None;
        if let Some(name) = self.interface_name.take() {
            tracing::debug!("capture closed on {}", name);
        }
        Ok(())
    }
}
