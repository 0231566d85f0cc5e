use core::fmt::Write;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

use super::{PeerReply, SimPeer};
use crate::event::EdgeDetector;
use crate::registry::SENSOR_HUB_ADDRESS;

const BASE_TEMP_C: f32 = 23.0;
const BASE_HUMIDITY_PCT: f32 = 40.0;
const BASE_PHOTO_LEVEL: f32 = 512.0;
const PHOTO_LEVEL_MAX: f32 = 1023.0;
/// Claps closer together than this are one event.
const CLAP_DEBOUNCE_MS: u64 = 1000;
/// Ages are capped so `C=` always fits the frame.
const MAX_REPORTED_AGE_S: u64 = 9999;

/// What the sensor node's own web endpoint serves as JSON.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SensorSnapshot {
    pub temp: f32,
    pub hum: f32,
    pub photo: u16,
    #[serde(rename = "clapAgo")]
    pub clap_ago: i64,
}

/// Simulated sensor node: temperature, humidity, and light readings with a
/// slow deterministic drift, plus a debounced clap detector whose age rides
/// in the `C=` field. Any request triggers the fixed-format report.
pub struct SensorHubPeer {
    base_temp: f32,
    base_hum: f32,
    base_photo: f32,
    drift: bool,
    last_clap: Option<Instant>,
    clap_edge: EdgeDetector,
    clap_rx: Option<mpsc::UnboundedReceiver<()>>,
    snapshot_tx: Option<watch::Sender<SensorSnapshot>>,
    epoch: Instant,
}

impl SensorHubPeer {
    pub fn new() -> Self {
        Self {
            base_temp: BASE_TEMP_C,
            base_hum: BASE_HUMIDITY_PCT,
            base_photo: BASE_PHOTO_LEVEL,
            drift: true,
            last_clap: None,
            clap_edge: EdgeDetector::new(CLAP_DEBOUNCE_MS),
            clap_rx: None,
            snapshot_tx: None,
            epoch: Instant::now(),
        }
    }

    /// Fixed readings, no drift. Reports become fully deterministic.
    pub fn with_readings(temp: f32, hum: f32, photo: u16) -> Self {
        let mut peer = Self::new();
        peer.base_temp = temp;
        peer.base_hum = hum;
        peer.base_photo = photo as f32;
        peer.drift = false;
        peer
    }

    /// One clap picked up by the microphone. Bounces within the debounce
    /// window collapse into the first event.
    pub fn inject_clap(&mut self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        if self.clap_edge.sample(true, now_ms) {
            self.last_clap = Some(Instant::now());
        }
        self.clap_edge.sample(false, now_ms);
    }

    /// Channel for feeding claps after the peer is on the bus.
    pub fn clap_channel(&mut self) -> mpsc::UnboundedSender<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clap_rx = Some(rx);
        tx
    }

    /// Latest-value channel for the node's web endpoint; updated on every
    /// handled request.
    pub fn snapshot_channel(&mut self) -> watch::Receiver<SensorSnapshot> {
        let (tx, rx) = watch::channel(self.snapshot());
        self.snapshot_tx = Some(tx);
        rx
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let (temp, hum, photo) = self.readings();
        SensorSnapshot {
            temp,
            hum,
            photo,
            clap_ago: self.clap_age_s(),
        }
    }

    fn readings(&self) -> (f32, f32, u16) {
        if !self.drift {
            return (self.base_temp, self.base_hum, self.base_photo as u16);
        }
        let t = self.epoch.elapsed().as_secs_f32();
        let temp = self.base_temp + 1.5 * (t * 0.05).sin();
        let hum = (self.base_hum + 4.0 * (t * 0.02).cos()).clamp(0.0, 100.0);
        let photo = (self.base_photo + 80.0 * (t * 0.013).sin()).clamp(0.0, PHOTO_LEVEL_MAX);
        (temp, hum, photo as u16)
    }

    fn clap_age_s(&self) -> i64 {
        match self.last_clap {
            Some(at) => at.elapsed().as_secs().min(MAX_REPORTED_AGE_S) as i64,
            None => -1,
        }
    }

    fn pump_clap_events(&mut self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        if let Some(rx) = self.clap_rx.as_mut() {
            while rx.try_recv().is_ok() {
                if self.clap_edge.sample(true, now_ms) {
                    self.last_clap = Some(Instant::now());
                }
                self.clap_edge.sample(false, now_ms);
            }
        }
    }
}

impl Default for SensorHubPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPeer for SensorHubPeer {
    fn address(&self) -> u8 {
        SENSOR_HUB_ADDRESS
    }

    fn handle(&mut self, _request: &str) -> Option<PeerReply> {
        self.pump_clap_events();

        let snapshot = self.snapshot();
        if let Some(tx) = self.snapshot_tx.as_ref() {
            tx.send_replace(snapshot);
        }

        let mut reply = PeerReply::new();
        let _ = write!(
            reply,
            "T={:.1} H={:.1} P={} C={}",
            snapshot.temp, snapshot.hum, snapshot.photo, snapshot.clap_ago
        );
        Some(reply)
    }
}
