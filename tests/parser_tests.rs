use busmaster::command::{parse_line, Command, ParseError};

#[test]
fn test_parse_servo_set() {
    let command = parse_line("SERVO SET 120").unwrap();
    assert_eq!(command, Command::ServoSet { angle: 120 });
}

#[test]
fn test_parse_servo_clamps_high_values() {
    // Out-of-range angles clamp instead of failing, like the actuator does.
    let command = parse_line("SERVO SET 200").unwrap();
    assert_eq!(command, Command::ServoSet { angle: 180 });
}

#[test]
fn test_parse_servo_clamps_negative_values() {
    let command = parse_line("SERVO SET -45").unwrap();
    assert_eq!(command, Command::ServoSet { angle: 0 });
}

#[test]
fn test_parse_stepper_move() {
    assert_eq!(
        parse_line("STEPPER MOVE 400").unwrap(),
        Command::StepperMove { steps: 400 }
    );
    assert_eq!(
        parse_line("STEPPER MOVE -250").unwrap(),
        Command::StepperMove { steps: -250 }
    );
}

#[test]
fn test_parse_stepper_move_out_of_range() {
    let result = parse_line("STEPPER MOVE 2000000");
    assert_eq!(result, Err(ParseError::ArgOutOfRange(2000000)));

    let result = parse_line("STEPPER MOVE -2000000");
    assert_eq!(result, Err(ParseError::ArgOutOfRange(-2000000)));
}

#[test]
fn test_parse_relay() {
    assert_eq!(parse_line("RELAY ON").unwrap(), Command::Relay { on: true });
    assert_eq!(parse_line("RELAY OFF").unwrap(), Command::Relay { on: false });
}

#[test]
fn test_parse_bare_verbs() {
    assert_eq!(parse_line("STATUS").unwrap(), Command::Status);
    assert_eq!(parse_line("SENSORS").unwrap(), Command::Sensors);
    assert_eq!(parse_line("STOP").unwrap(), Command::Stop);
}

#[test]
fn test_parse_tolerates_extra_whitespace() {
    assert_eq!(
        parse_line("  SERVO   SET   90  ").unwrap(),
        Command::ServoSet { angle: 90 }
    );
}

#[test]
fn test_parse_unknown_verb() {
    let result = parse_line("FROBNICATE 1");
    assert!(matches!(result, Err(ParseError::UnknownVerb(_))));
}

#[test]
fn test_parse_verbs_are_case_sensitive() {
    assert!(matches!(
        parse_line("servo set 90"),
        Err(ParseError::UnknownVerb(_))
    ));
    assert!(matches!(
        parse_line("Status"),
        Err(ParseError::UnknownVerb(_))
    ));
}

#[test]
fn test_parse_bad_arguments() {
    assert!(matches!(
        parse_line("SERVO SET abc"),
        Err(ParseError::BadArgument(_))
    ));
    assert!(matches!(
        parse_line("SERVO SET"),
        Err(ParseError::BadArgument(_))
    ));
    assert!(matches!(
        parse_line("RELAY MAYBE"),
        Err(ParseError::BadArgument(_))
    ));
    assert!(matches!(
        parse_line("RELAY"),
        Err(ParseError::BadArgument(_))
    ));
}

#[test]
fn test_parse_wrong_subverb() {
    assert!(matches!(
        parse_line("SERVO NUDGE 10"),
        Err(ParseError::UnknownVerb(_))
    ));
    assert!(matches!(
        parse_line("STEPPER SPIN 10"),
        Err(ParseError::UnknownVerb(_))
    ));
}

#[test]
fn test_parse_rejects_trailing_tokens() {
    assert!(matches!(
        parse_line("STATUS NOW"),
        Err(ParseError::BadArgument(_))
    ));
    assert!(matches!(
        parse_line("RELAY ON PLEASE"),
        Err(ParseError::BadArgument(_))
    ));
}
