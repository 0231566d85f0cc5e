use arrayvec::ArrayString;
use core::fmt::Write;

use crate::command::Command;
use crate::registry::PeerId;
use crate::transport::FRAME_LEN;

/// A bus payload never exceeds one frame.
pub type PayloadBuffer = ArrayString<FRAME_LEN>;

/// Operations the master handles itself; they never reach the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
    StartPolling,
    StopPolling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    Local(LocalOp),
    Dispatch { peer: PeerId, payload: PayloadBuffer },
}

/// Decide who handles a command: exactly one peer for device commands, the
/// master itself for polling control. Dispatched payloads are the ASCII
/// vocabulary the target device accepts.
pub fn route(command: &Command) -> RouteAction {
    match command {
        Command::ServoSet { angle } => dispatch(PeerId::Actuator, format_args!("SERVO SET {}", angle)),
        Command::StepperMove { steps } => {
            dispatch(PeerId::Actuator, format_args!("STEPPER MOVE {}", steps))
        }
        Command::Relay { on } => dispatch(
            PeerId::Actuator,
            format_args!("RELAY {}", if *on { "ON" } else { "OFF" }),
        ),
        Command::Status => dispatch(PeerId::Actuator, format_args!("STATUS")),
        Command::Sensors => RouteAction::Local(LocalOp::StartPolling),
        Command::Stop => RouteAction::Local(LocalOp::StopPolling),
    }
}

fn dispatch(peer: PeerId, args: core::fmt::Arguments<'_>) -> RouteAction {
    let mut payload = PayloadBuffer::new();
    let _ = payload.write_fmt(args);
    RouteAction::Dispatch { peer, payload }
}
