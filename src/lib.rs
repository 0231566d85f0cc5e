//! # Bus Master
//!
//! A single-master orchestrator for a shared addressed bus: operator text
//! commands arrive over a serial-style line channel, get routed to the
//! subordinate device that owns them, and the sensor peer is polled on a
//! fixed period in the background, with all responses merged back onto the
//! operator channel one line at a time.
//!
//! ## Features
//!
//! - **Command routing**: line-oriented operator protocol parsed into typed
//!   commands and dispatched to exactly one bus peer
//! - **Fixed-size framing**: 32-byte NUL-padded ASCII frames with bounded
//!   response timeouts
//! - **Periodic polling**: independently cancellable sensor polling that
//!   shares the bus under a single mutual-exclusion guard
//! - **Schema-driven decoding**: per-peer field tables, so a new peer needs a
//!   new schema, not new decode code
//! - **Event merging**: asynchronous device events (button presses) latched
//!   and surfaced on exactly one response line
//!
//! ## Quick Start
//!
//! ```
//! use busmaster::{MasterConfig, Orchestrator};
//! use busmaster::peers::{ActuatorPeer, SensorHubPeer, SimBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut bus = SimBus::new();
//! bus.attach(Box::new(ActuatorPeer::new()));
//! bus.attach(Box::new(SensorHubPeer::new()));
//!
//! let master = Orchestrator::new(Box::new(bus), MasterConfig::default()).unwrap();
//! let line = master.execute_line("STATUS").await;
//! assert_eq!(line.as_str(), "SERVO=90 RELAY=OFF STEPPER=0");
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`command`] - operator line parsing
//! - [`router`] - command-to-peer dispatch decisions
//! - [`transport`] - fixed-size frame exchange with timeouts
//! - [`registry`] - static peer table (addresses and schemas)
//! - [`aggregator`] - schema-driven frame decoding and line formatting
//! - [`poller`] - periodic sensor polling state machine and task
//! - [`event`] - event latch and debounce edge detection
//! - [`orchestrator`] - the master itself, owning the bus guard
//! - [`peers`] - simulated bus peers for development and tests

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod command;
pub mod event;
pub mod orchestrator;
pub mod peers;
pub mod poller;
pub mod registry;
pub mod router;
pub mod transport;

pub use command::{Command, ParseError};
pub use orchestrator::{MasterConfig, MasterStats, Orchestrator};
pub use registry::{Peer, PeerId, PeerRegistry};
pub use transport::{BusLink, BusTransport, Frame, TransportError, FRAME_LEN};
