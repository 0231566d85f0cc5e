use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregator::{FieldKind, FieldSpec, FrameSchema};
use crate::transport::{ADDRESS_MAX, FRAME_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerId {
    Actuator,
    SensorHub,
}

/// Static configuration for one subordinate device. Read-only at runtime;
/// the peer set is fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct Peer {
    pub id: PeerId,
    pub name: &'static str,
    pub address: u8,
    pub frame_len: usize,
    pub schema: &'static FrameSchema,
}

/// Actuator status frames: `SERVO=<n> RELAY=<ON/OFF> STEPPER=<n>`, with an
/// optional trailing button marker. Plain `OK`/`ERR` acks share the schema.
pub static ACTUATOR_SCHEMA: FrameSchema = FrameSchema {
    fields: &[
        FieldSpec {
            key: "SERVO",
            kind: FieldKind::Int,
        },
        FieldSpec {
            key: "RELAY",
            kind: FieldKind::Switch,
        },
        FieldSpec {
            key: "STEPPER",
            kind: FieldKind::Int,
        },
    ],
    event_marker: Some("+BTN PRESSED"),
};

/// Sensor-hub report frames: `T=<f> H=<f> P=<int> C=<int|-1>`.
pub static SENSOR_HUB_SCHEMA: FrameSchema = FrameSchema {
    fields: &[
        FieldSpec {
            key: "T",
            kind: FieldKind::Float,
        },
        FieldSpec {
            key: "H",
            kind: FieldKind::Float,
        },
        FieldSpec {
            key: "P",
            kind: FieldKind::Int,
        },
        FieldSpec {
            key: "C",
            kind: FieldKind::EventAge,
        },
    ],
    event_marker: None,
};

pub const ACTUATOR_ADDRESS: u8 = 0x10;
pub const SENSOR_HUB_ADDRESS: u8 = 0x11;

static PEERS: &[Peer] = &[
    Peer {
        id: PeerId::Actuator,
        name: "actuator",
        address: ACTUATOR_ADDRESS,
        frame_len: FRAME_LEN,
        schema: &ACTUATOR_SCHEMA,
    },
    Peer {
        id: PeerId::SensorHub,
        name: "sensor-hub",
        address: SENSOR_HUB_ADDRESS,
        frame_len: FRAME_LEN,
        schema: &SENSOR_HUB_SCHEMA,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown peer `{0}`")]
    UnknownPeer(String),
    #[error("peer address {0:#04x} exceeds the 7-bit bus range")]
    AddressOutOfRange(u8),
    #[error("duplicate bus address {0:#04x}")]
    DuplicateAddress(u8),
    #[error("unsupported frame size {0}")]
    BadFrameSize(usize),
}

/// Maps logical peer names to bus addresses and decode schemas. Construction
/// validates the table; a bad peer configuration is fatal at startup only.
#[derive(Debug, Clone, Copy)]
pub struct PeerRegistry {
    peers: &'static [Peer],
}

impl PeerRegistry {
    pub fn new() -> Result<Self, RegistryError> {
        for (index, peer) in PEERS.iter().enumerate() {
            if peer.address > ADDRESS_MAX {
                return Err(RegistryError::AddressOutOfRange(peer.address));
            }
            if peer.frame_len != FRAME_LEN {
                return Err(RegistryError::BadFrameSize(peer.frame_len));
            }
            if PEERS[..index].iter().any(|p| p.address == peer.address) {
                return Err(RegistryError::DuplicateAddress(peer.address));
            }
        }
        Ok(Self { peers: PEERS })
    }

    pub fn get(&self, id: PeerId) -> &'static Peer {
        // The table always carries every PeerId variant.
        self.peers
            .iter()
            .find(|peer| peer.id == id)
            .unwrap_or(&self.peers[0])
    }

    pub fn lookup(&self, name: &str) -> Result<&'static Peer, RegistryError> {
        self.peers
            .iter()
            .find(|peer| peer.name == name)
            .ok_or_else(|| RegistryError::UnknownPeer(name.to_string()))
    }

    pub fn peers(&self) -> &'static [Peer] {
        self.peers
    }
}
