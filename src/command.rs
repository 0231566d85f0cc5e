use thiserror::Error;

/// Servo travel in degrees. Out-of-range angles are clamped, matching the
/// actuator's own clamping policy so master and device stay consistent.
pub const SERVO_MAX_DEG: i64 = 180;

/// Largest stepper move the actuator vocabulary accepts in one command.
pub const STEPPER_MOVE_LIMIT: i64 = 1_000_000;

/// One parsed operator command. Immutable once produced; consumed by the
/// router and discarded after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ServoSet { angle: u8 },
    StepperMove { steps: i32 },
    Relay { on: bool },
    Status,
    Sensors,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("bad argument `{0}`")]
    BadArgument(String),
    #[error("argument out of range: {0}")]
    ArgOutOfRange(i64),
}

/// Parse one operator line into a [`Command`].
///
/// Tokenization is whitespace-delimited and verbs match case-sensitively.
/// Unknown verbs are an error, never a silent no-op.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens
        .next()
        .ok_or_else(|| ParseError::UnknownVerb(String::new()))?;

    let command = match verb {
        "SERVO" => {
            expect_keyword(&mut tokens, "SET")?;
            let angle = parse_int(&mut tokens)?;
            // Clamp rather than reject: the actuator clamps too.
            Command::ServoSet {
                angle: angle.clamp(0, SERVO_MAX_DEG) as u8,
            }
        }
        "STEPPER" => {
            expect_keyword(&mut tokens, "MOVE")?;
            let steps = parse_int(&mut tokens)?;
            if !(-STEPPER_MOVE_LIMIT..=STEPPER_MOVE_LIMIT).contains(&steps) {
                return Err(ParseError::ArgOutOfRange(steps));
            }
            Command::StepperMove {
                steps: steps as i32,
            }
        }
        "RELAY" => match tokens.next() {
            Some("ON") => Command::Relay { on: true },
            Some("OFF") => Command::Relay { on: false },
            Some(other) => return Err(ParseError::BadArgument(other.to_string())),
            None => return Err(ParseError::BadArgument(String::new())),
        },
        "STATUS" => Command::Status,
        "SENSORS" => Command::Sensors,
        "STOP" => Command::Stop,
        other => return Err(ParseError::UnknownVerb(other.to_string())),
    };

    // One command per line; trailing tokens are not silently discarded.
    if let Some(extra) = tokens.next() {
        return Err(ParseError::BadArgument(extra.to_string()));
    }

    Ok(command)
}

fn expect_keyword<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    keyword: &'static str,
) -> Result<(), ParseError> {
    match tokens.next() {
        Some(token) if token == keyword => Ok(()),
        Some(other) => Err(ParseError::UnknownVerb(other.to_string())),
        None => Err(ParseError::BadArgument(String::new())),
    }
}

fn parse_int<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<i64, ParseError> {
    let token = tokens.next().ok_or_else(|| ParseError::BadArgument(String::new()))?;
    token
        .parse::<i64>()
        .map_err(|_| ParseError::BadArgument(token.to_string()))
}
