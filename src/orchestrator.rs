use core::fmt::Write;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::aggregator::{self, LineBuffer};
use crate::command;
use crate::event::EventLatch;
use crate::poller::{PollOutcome, PollState, PollStats};
use crate::registry::{Peer, PeerId, PeerRegistry, RegistryError};
use crate::router::{route, LocalOp, RouteAction};
use crate::transport::{BusLink, BusTransport, Frame, TransportError, TransportStats};

const DEFAULT_BUS_TIMEOUT_MS: u64 = 250;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Payload sent to the sensor hub on every poll; any request triggers its
/// fixed-format report.
const SENSOR_READ_REQUEST: &str = "STATUS";

#[derive(Debug, Clone, Copy)]
pub struct MasterConfig {
    pub bus_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bus_timeout: Duration::from_millis(DEFAULT_BUS_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MasterStats {
    pub commands: u32,
    pub parse_errors: u32,
    pub timeouts: u32,
    pub bad_frames: u32,
    pub poll: PollStats,
}

/// The master itself. Owns the peer registry, the single bus endpoint, the
/// polling state machine, and the event latch, each behind its own guard and
/// touched only through short acquire/release scopes.
///
/// Mutual exclusion on the bus is the hard invariant here: operator-routed
/// and poller-routed transactions both go through `self.bus`, so two
/// payloads can never share a frame write. The poller only ever try-locks
/// and defers, which leaves a waiting operator command first in line.
pub struct Orchestrator {
    registry: PeerRegistry,
    config: MasterConfig,
    bus: Mutex<BusTransport>,
    poll: Mutex<PollState>,
    button: Mutex<EventLatch>,
    stats: Mutex<MasterStats>,
}

impl Orchestrator {
    pub fn new(link: Box<dyn BusLink>, config: MasterConfig) -> Result<Self, RegistryError> {
        let registry = PeerRegistry::new()?;
        Ok(Self {
            registry,
            config,
            bus: Mutex::new(BusTransport::new(link, config.bus_timeout)),
            poll: Mutex::new(PollState::new(config.poll_interval)),
            button: Mutex::new(EventLatch::new()),
            stats: Mutex::new(MasterStats::default()),
        })
    }

    /// Handle one operator line. Every line yields exactly one response
    /// line, success or failure; no error escapes a single command.
    pub async fn execute_line(&self, line: &str) -> LineBuffer {
        {
            let mut stats = self.stats.lock().await;
            stats.commands = stats.commands.wrapping_add(1);
        }

        let parsed = match command::parse_line(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "rejected operator line");
                let mut stats = self.stats.lock().await;
                stats.parse_errors = stats.parse_errors.wrapping_add(1);
                return literal("ERR CMD");
            }
        };

        match route(&parsed) {
            RouteAction::Local(op) => self.apply_local(op).await,
            RouteAction::Dispatch { peer, payload } => self.dispatch(peer, &payload).await,
        }
    }

    /// One scheduled poll attempt. Never blocks on a busy bus: a Deferred
    /// outcome asks the caller to retry in the next free slot. Per-tick
    /// errors are logged and swallowed so polling survives a flaky peer.
    pub async fn poll_tick(&self) -> PollOutcome {
        if !self.poll.lock().await.is_enabled() {
            return PollOutcome::Disabled;
        }

        let peer = self.registry.get(PeerId::SensorHub);
        let result = match self.bus.try_lock() {
            Ok(mut bus) => bus.transact(peer.address, SENSOR_READ_REQUEST),
            Err(_) => {
                let mut stats = self.stats.lock().await;
                stats.poll.deferred = stats.poll.deferred.wrapping_add(1);
                return PollOutcome::Deferred;
            }
        };

        {
            let mut stats = self.stats.lock().await;
            stats.poll.ticks = stats.poll.ticks.wrapping_add(1);
        }
        self.poll.lock().await.mark_polled(Instant::now());

        match result {
            Ok(frame) => match aggregator::decode_frame(peer.schema, &frame) {
                Ok(decoded) => {
                    let line = aggregator::format_line(peer.schema, &decoded.body, false);
                    let mut stats = self.stats.lock().await;
                    stats.poll.reports = stats.poll.reports.wrapping_add(1);
                    PollOutcome::Report(line)
                }
                Err(err) => {
                    warn!(peer = peer.name, %err, "undecodable poll frame, tick skipped");
                    self.skip_tick().await
                }
            },
            Err(TransportError::Timeout { .. }) => {
                warn!(peer = peer.name, "poll timed out, tick skipped");
                self.skip_tick().await
            }
        }
    }

    pub fn config(&self) -> MasterConfig {
        self.config
    }

    pub async fn stats(&self) -> MasterStats {
        *self.stats.lock().await
    }

    pub async fn polling_enabled(&self) -> bool {
        self.poll.lock().await.is_enabled()
    }

    pub async fn last_poll(&self) -> Option<Instant> {
        self.poll.lock().await.last_poll()
    }

    pub async fn transport_stats(&self) -> TransportStats {
        self.bus.lock().await.stats()
    }

    async fn apply_local(&self, op: LocalOp) -> LineBuffer {
        let mut poll = self.poll.lock().await;
        match op {
            LocalOp::StartPolling => {
                if poll.enable() {
                    info!(interval = ?poll.interval(), "sensor polling enabled");
                }
                literal("OK SENSORS")
            }
            LocalOp::StopPolling => {
                if poll.disable() {
                    info!("sensor polling disabled");
                }
                literal("OK STOP")
            }
        }
    }

    /// One synchronous bus transaction for an operator command. The operator
    /// channel waits for the response (or the timeout); there is no
    /// automatic retry, re-issuing the command is the operator's call.
    async fn dispatch(&self, peer_id: PeerId, payload: &str) -> LineBuffer {
        let peer = self.registry.get(peer_id);
        let result = {
            let mut bus = self.bus.lock().await;
            bus.transact(peer.address, payload)
        };

        match result {
            Ok(frame) => self.absorb(peer, &frame).await,
            Err(TransportError::Timeout { .. }) => {
                {
                    let mut stats = self.stats.lock().await;
                    stats.timeouts = stats.timeouts.wrapping_add(1);
                }
                warn!(peer = peer.name, "peer did not answer within the bus timeout");
                let mut line = LineBuffer::new();
                let _ = write!(line, "ERR TIMEOUT {}", peer.name);
                line
            }
        }
    }

    /// Decode a response frame and fold any latched event into the line.
    async fn absorb(&self, peer: &Peer, frame: &Frame) -> LineBuffer {
        match aggregator::decode_frame(peer.schema, frame) {
            Ok(decoded) => {
                let append_event = {
                    let mut button = self.button.lock().await;
                    if decoded.event {
                        button.raise();
                    }
                    peer.schema.event_marker.is_some() && button.take()
                };
                aggregator::format_line(peer.schema, &decoded.body, append_event)
            }
            Err(err) => {
                {
                    let mut stats = self.stats.lock().await;
                    stats.bad_frames = stats.bad_frames.wrapping_add(1);
                }
                warn!(peer = peer.name, %err, "undecodable frame");
                let mut line = LineBuffer::new();
                let _ = write!(line, "ERR BADFRAME {}", peer.name);
                line
            }
        }
    }

    async fn skip_tick(&self) -> PollOutcome {
        let mut stats = self.stats.lock().await;
        stats.poll.skipped = stats.poll.skipped.wrapping_add(1);
        PollOutcome::Skipped
    }
}

fn literal(text: &str) -> LineBuffer {
    let mut line = LineBuffer::new();
    let _ = line.try_push_str(text);
    line
}
