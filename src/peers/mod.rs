//! Simulated bus peers. The physical devices live on the far side of the
//! multi-drop bus; these stand-ins answer the same vocabulary behind the
//! [`BusLink`] seam so the master can be exercised end-to-end.

pub mod actuator;
pub mod sensor_hub;

pub use actuator::ActuatorPeer;
pub use sensor_hub::{SensorHubPeer, SensorSnapshot};

use arrayvec::ArrayString;
use std::time::Duration;

use crate::transport::{BusLink, Frame, TransportError, FRAME_LEN};

/// A device reply always fits one frame; anything longer would be truncated
/// on the wire anyway.
pub type PeerReply = ArrayString<FRAME_LEN>;

/// One simulated device on the bus.
pub trait SimPeer: Send {
    fn address(&self) -> u8;

    /// Handle one request payload. `None` models a device that stays quiet,
    /// which the master observes as a timeout.
    fn handle(&mut self, request: &str) -> Option<PeerReply>;
}

const MAX_SIM_PEERS: usize = 8;

/// In-process multi-drop bus. Exactly one exchange at a time, like the real
/// thing; peers can be forced offline or given response latency so timeout
/// paths are reachable from tests.
pub struct SimBus {
    peers: Vec<Box<dyn SimPeer>>,
    offline: heapless::Vec<u8, MAX_SIM_PEERS>,
    latency: heapless::Vec<(u8, Duration), MAX_SIM_PEERS>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            peers: Vec::new(),
            offline: heapless::Vec::new(),
            latency: heapless::Vec::new(),
        }
    }

    pub fn attach(&mut self, peer: Box<dyn SimPeer>) {
        self.peers.push(peer);
    }

    /// Force a device off the bus; requests to it go unanswered.
    pub fn set_offline(&mut self, address: u8, offline: bool) {
        if offline {
            if !self.offline.contains(&address) {
                let _ = self.offline.push(address);
            }
        } else {
            self.offline.retain(|&a| a != address);
        }
    }

    /// Add response latency to a device. Latency at or beyond the bus
    /// timeout turns into a timeout without actually waiting.
    pub fn set_latency(&mut self, address: u8, latency: Duration) {
        self.latency.retain(|&(a, _)| a != address);
        let _ = self.latency.push((address, latency));
    }

    fn latency_for(&self, address: u8) -> Option<Duration> {
        self.latency
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, d)| *d)
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusLink for SimBus {
    fn exchange(
        &mut self,
        request: &Frame,
        timeout: Duration,
    ) -> Result<Option<Frame>, TransportError> {
        let address = request.address;

        if self.offline.contains(&address) {
            return Ok(None);
        }
        if let Some(latency) = self.latency_for(address) {
            if latency >= timeout {
                return Ok(None);
            }
            std::thread::sleep(latency);
        }

        let Some(peer) = self.peers.iter_mut().find(|p| p.address() == address) else {
            // Nobody at this address; the bus just stays silent.
            return Ok(None);
        };
        let Some(text) = request.text() else {
            return Ok(None);
        };

        Ok(peer
            .handle(text)
            .map(|reply| Frame::from_str(address, &reply)))
    }
}
