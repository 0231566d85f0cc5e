use serde::Serialize;
use static_assertions::const_assert;
use std::time::Duration;
use thiserror::Error;

/// Every peer on the bus answers with exactly this many bytes. There is no
/// checksum and no delimiter beyond the fixed length, so a corrupted frame is
/// indistinguishable from a valid-but-wrong response; callers treat frames
/// that fail to decode as bad and do not attempt recovery.
pub const FRAME_LEN: usize = 32;

/// Peer addresses are 7-bit on the wire.
pub const ADDRESS_MAX: u8 = 0x7F;

const_assert!(FRAME_LEN >= 16);

/// One fixed-size bus packet. Transient; lives for a single transaction.
/// Payloads shorter than [`FRAME_LEN`] are NUL-padded, longer ones truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    payload: [u8; FRAME_LEN],
}

impl Frame {
    pub fn from_str(address: u8, text: &str) -> Self {
        let mut payload = [0u8; FRAME_LEN];
        let bytes = text.as_bytes();
        let len = bytes.len().min(FRAME_LEN);
        payload[..len].copy_from_slice(&bytes[..len]);
        Self { address, payload }
    }

    pub fn from_bytes(address: u8, bytes: &[u8]) -> Self {
        let mut payload = [0u8; FRAME_LEN];
        let len = bytes.len().min(FRAME_LEN);
        payload[..len].copy_from_slice(&bytes[..len]);
        Self { address, payload }
    }

    pub fn payload(&self) -> &[u8; FRAME_LEN] {
        &self.payload
    }

    /// The ASCII portion of the payload, up to the NUL padding. `None` when
    /// the frame does not hold valid text.
    pub fn text(&self) -> Option<&str> {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FRAME_LEN);
        core::str::from_utf8(&self.payload[..end]).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no response from address {address:#04x}")]
    Timeout { address: u8 },
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TransportStats {
    pub transactions: u32,
    pub timeouts: u32,
}

/// The wire seam. A production link drives the physical multi-drop bus; the
/// simulated link in [`crate::peers`] answers in-process. `exchange` performs
/// one full addressed request/response and returns `Ok(None)` when no
/// response arrived within `timeout`.
pub trait BusLink: Send {
    fn exchange(
        &mut self,
        request: &Frame,
        timeout: Duration,
    ) -> Result<Option<Frame>, TransportError>;
}

/// Single shared bus endpoint. Exactly one transaction is in flight at any
/// instant; the orchestrator holds this behind one guard and a transaction
/// (request write, then response read) completes while the guard is held.
pub struct BusTransport {
    link: Box<dyn BusLink>,
    timeout: Duration,
    stats: TransportStats,
}

impl BusTransport {
    pub fn new(link: Box<dyn BusLink>, timeout: Duration) -> Self {
        Self {
            link,
            timeout,
            stats: TransportStats::default(),
        }
    }

    /// One blocking request/response exchange with `address`. The payload is
    /// padded or truncated to exactly [`FRAME_LEN`] bytes before it leaves.
    pub fn transact(&mut self, address: u8, payload: &str) -> Result<Frame, TransportError> {
        let request = Frame::from_str(address, payload);
        self.stats.transactions = self.stats.transactions.wrapping_add(1);

        match self.link.exchange(&request, self.timeout)? {
            Some(response) => Ok(response),
            None => {
                self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
                Err(TransportError::Timeout { address })
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }
}

impl core::fmt::Debug for BusTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusTransport")
            .field("timeout", &self.timeout)
            .field("stats", &self.stats)
            .finish()
    }
}
