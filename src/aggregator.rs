//! Schema-driven decoding of peer frames and formatting of operator lines.
//!
//! Decoding is driven by a per-peer field table, not by peer identity: a new
//! peer gets a new [`FrameSchema`] entry in the registry and the decode loop
//! here stays untouched.

use arrayvec::ArrayString;
use core::fmt::Write;
use heapless::Vec;
use static_assertions::const_assert;
use thiserror::Error;

use crate::transport::{Frame, FRAME_LEN};

/// Upper bound for one formatted operator line.
pub const MAX_LINE: usize = 96;

/// Fields per frame schema.
pub const MAX_FIELDS: usize = 8;

/// Event ages at or beyond this are reported as stale ("none").
pub const STALE_EVENT_AGE_S: i64 = 1000;

// A whole frame plus an appended event marker must fit in one line.
const_assert!(MAX_LINE >= FRAME_LEN + 32);

pub type LineBuffer = ArrayString<MAX_LINE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed integer.
    Int,
    /// Decimal reading, formatted to one fractional digit.
    Float,
    /// `ON` / `OFF`.
    Switch,
    /// Seconds since an event; negative or stale values read as "none".
    EventAge,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
}

/// Declarative decode schema for one peer's response frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameSchema {
    pub fields: &'static [FieldSpec],
    /// Marker token a peer may append to signal an asynchronous event.
    pub event_marker: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f32),
    Switch(bool),
    EventAge(Option<u32>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    /// `OK …` / `ERR …` acknowledgement text, passed through verbatim.
    Ack(LineBuffer),
    /// Field values in schema order.
    Report(Vec<FieldValue, MAX_FIELDS>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub body: DecodedBody,
    /// True when the frame carried the schema's event marker.
    pub event: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame payload is not text")]
    NotText,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("malformed field `{0}`")]
    MalformedField(&'static str),
    #[error("unexpected trailing token")]
    TrailingToken,
}

/// Decode one fixed-size frame against `schema`. Malformed frames fail as a
/// whole; partially-populated output is never produced.
pub fn decode_frame(schema: &FrameSchema, frame: &Frame) -> Result<DecodedFrame, DecodeError> {
    let text = frame.text().ok_or(DecodeError::NotText)?;
    let text = text.trim_end();

    let (body_text, event) = match schema.event_marker {
        Some(marker) => match text.strip_suffix(marker) {
            Some(rest) => (rest.trim_end(), true),
            None => (text, false),
        },
        None => (text, false),
    };

    if body_text.starts_with("OK") || body_text.starts_with("ERR") {
        let mut ack = LineBuffer::new();
        let _ = ack.try_push_str(body_text);
        return Ok(DecodedFrame {
            body: DecodedBody::Ack(ack),
            event,
        });
    }

    let mut values: Vec<FieldValue, MAX_FIELDS> = Vec::new();
    let mut tokens = body_text.split_whitespace();
    for spec in schema.fields {
        let token = tokens.next().ok_or(DecodeError::MissingField(spec.key))?;
        let raw = token
            .strip_prefix(spec.key)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or(DecodeError::MissingField(spec.key))?;
        let value = parse_field(spec, raw)?;
        values
            .push(value)
            .map_err(|_| DecodeError::TrailingToken)?;
    }
    if tokens.next().is_some() {
        return Err(DecodeError::TrailingToken);
    }

    Ok(DecodedFrame {
        body: DecodedBody::Report(values),
        event,
    })
}

fn parse_field(spec: &FieldSpec, raw: &str) -> Result<FieldValue, DecodeError> {
    match spec.kind {
        FieldKind::Int => raw
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| DecodeError::MalformedField(spec.key)),
        FieldKind::Float => raw
            .parse::<f32>()
            .map(FieldValue::Float)
            .map_err(|_| DecodeError::MalformedField(spec.key)),
        FieldKind::Switch => match raw {
            "ON" => Ok(FieldValue::Switch(true)),
            "OFF" => Ok(FieldValue::Switch(false)),
            _ => Err(DecodeError::MalformedField(spec.key)),
        },
        FieldKind::EventAge => {
            let age = raw
                .parse::<i64>()
                .map_err(|_| DecodeError::MalformedField(spec.key))?;
            if (0..STALE_EVENT_AGE_S).contains(&age) {
                Ok(FieldValue::EventAge(Some(age as u32)))
            } else {
                Ok(FieldValue::EventAge(None))
            }
        }
    }
}

/// Format one decoded frame as a single operator line. When `append_event`
/// is set the schema's marker is appended, surfacing a latched event exactly
/// once.
pub fn format_line(schema: &FrameSchema, body: &DecodedBody, append_event: bool) -> LineBuffer {
    let mut line = LineBuffer::new();

    match body {
        DecodedBody::Ack(ack) => {
            let _ = line.try_push_str(ack);
        }
        DecodedBody::Report(values) => {
            for (spec, value) in schema.fields.iter().zip(values.iter()) {
                if !line.is_empty() {
                    let _ = line.try_push(' ');
                }
                let _ = write!(line, "{}=", spec.key);
                match value {
                    FieldValue::Int(v) => {
                        let _ = write!(line, "{}", v);
                    }
                    FieldValue::Float(v) => {
                        let _ = write!(line, "{:.1}", v);
                    }
                    FieldValue::Switch(on) => {
                        let _ = line.try_push_str(if *on { "ON" } else { "OFF" });
                    }
                    FieldValue::EventAge(Some(age)) => {
                        let _ = write!(line, "{}", age);
                    }
                    FieldValue::EventAge(None) => {
                        let _ = line.try_push_str("none");
                    }
                }
            }
        }
    }

    if append_event {
        if let Some(marker) = schema.event_marker {
            let _ = write!(line, " {}", marker);
        }
    }

    line
}
