use core::fmt::Write;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::mpsc;

use super::{PeerReply, SimPeer};
use crate::event::EdgeDetector;
use crate::registry::ACTUATOR_ADDRESS;
use crate::transport::FRAME_LEN;

const SERVO_CENTER_DEG: u8 = 90;
const SERVO_MAX_DEG: i32 = 180;
/// Soft travel limits; the position display also has to fit one frame.
const STEPPER_TRAVEL_LIMIT: i32 = 999;
const BUTTON_DEBOUNCE_MS: u64 = 250;
const BUTTON_MARKER: &str = "+BTN PRESSED";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ActuatorState {
    pub servo_deg: u8,
    pub relay_on: bool,
    pub stepper_pos: i32,
}

/// Simulated actuator node: servo, relay, stepper, and a debounced button.
/// A registered press arms the button marker, which rides out on the next
/// response with room for it, once.
pub struct ActuatorPeer {
    servo_deg: u8,
    relay_on: bool,
    stepper_pos: i32,
    marker_armed: bool,
    debounce: EdgeDetector,
    button_rx: Option<mpsc::UnboundedReceiver<()>>,
    epoch: Instant,
}

impl ActuatorPeer {
    pub fn new() -> Self {
        Self::with_debounce_interval(BUTTON_DEBOUNCE_MS)
    }

    pub fn with_debounce_interval(min_interval_ms: u64) -> Self {
        Self {
            servo_deg: SERVO_CENTER_DEG,
            relay_on: false,
            stepper_pos: 0,
            marker_armed: false,
            debounce: EdgeDetector::new(min_interval_ms),
            button_rx: None,
            epoch: Instant::now(),
        }
    }

    /// Channel for feeding button presses after the peer is on the bus.
    pub fn button_channel(&mut self) -> mpsc::UnboundedSender<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.button_rx = Some(rx);
        tx
    }

    /// One physical press-and-release of the button.
    pub fn press_button(&mut self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        if self.debounce.sample(true, now_ms) {
            self.marker_armed = true;
        }
        self.debounce.sample(false, now_ms);
    }

    pub fn state(&self) -> ActuatorState {
        ActuatorState {
            servo_deg: self.servo_deg,
            relay_on: self.relay_on,
            stepper_pos: self.stepper_pos,
        }
    }

    fn pump_button_events(&mut self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        if let Some(rx) = self.button_rx.as_mut() {
            while rx.try_recv().is_ok() {
                if self.debounce.sample(true, now_ms) {
                    self.marker_armed = true;
                }
                self.debounce.sample(false, now_ms);
            }
        }
    }

    /// Append the armed marker when the reply has room for it; otherwise it
    /// stays armed for the next response.
    fn finish(&mut self, mut reply: PeerReply) -> PeerReply {
        if self.marker_armed && reply.len() + BUTTON_MARKER.len() + 1 <= FRAME_LEN {
            let _ = write!(reply, " {}", BUTTON_MARKER);
            self.marker_armed = false;
        }
        reply
    }
}

impl Default for ActuatorPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPeer for ActuatorPeer {
    fn address(&self) -> u8 {
        ACTUATOR_ADDRESS
    }

    fn handle(&mut self, request: &str) -> Option<PeerReply> {
        self.pump_button_events();

        let mut tokens = request.split_whitespace();
        let reply = match tokens.next() {
            Some("SERVO") => match (tokens.next(), next_int(&mut tokens)) {
                (Some("SET"), Some(angle)) => {
                    self.servo_deg = angle.clamp(0, SERVO_MAX_DEG) as u8;
                    literal("OK SERVO")
                }
                _ => literal("ERR CMD"),
            },
            Some("STEPPER") => match (tokens.next(), next_int(&mut tokens)) {
                (Some("MOVE"), Some(steps)) => {
                    self.stepper_pos = self
                        .stepper_pos
                        .saturating_add(steps)
                        .clamp(-STEPPER_TRAVEL_LIMIT, STEPPER_TRAVEL_LIMIT);
                    literal("OK STEPPER")
                }
                _ => literal("ERR CMD"),
            },
            Some("RELAY") => match tokens.next() {
                Some("ON") => {
                    self.relay_on = true;
                    literal("OK RELAY ON")
                }
                Some("OFF") => {
                    self.relay_on = false;
                    literal("OK RELAY OFF")
                }
                _ => literal("ERR CMD"),
            },
            Some("STATUS") => {
                let mut reply = PeerReply::new();
                let _ = write!(
                    reply,
                    "SERVO={} RELAY={} STEPPER={}",
                    self.servo_deg,
                    if self.relay_on { "ON" } else { "OFF" },
                    self.stepper_pos
                );
                reply
            }
            _ => literal("ERR CMD"),
        };

        Some(self.finish(reply))
    }
}

fn next_int<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<i32> {
    tokens.next().and_then(|t| t.parse::<i32>().ok())
}

fn literal(text: &str) -> PeerReply {
    let mut reply = PeerReply::new();
    let _ = reply.try_push_str(text);
    reply
}
