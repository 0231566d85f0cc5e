use busmaster::peers::{ActuatorPeer, PeerReply, SensorHubPeer, SimBus, SimPeer};
use busmaster::poller::PollOutcome;
use busmaster::registry::{ACTUATOR_ADDRESS, SENSOR_HUB_ADDRESS};
use busmaster::{MasterConfig, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> MasterConfig {
    MasterConfig {
        bus_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
    }
}

/// Actuator plus a fixed-reading sensor hub, so responses are deterministic.
fn default_bus() -> SimBus {
    let mut bus = SimBus::new();
    bus.attach(Box::new(ActuatorPeer::with_debounce_interval(10_000)));
    bus.attach(Box::new(SensorHubPeer::with_readings(23.4, 41.0, 512)));
    bus
}

fn master_with(bus: SimBus) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(Box::new(bus), test_config()).unwrap())
}

#[tokio::test]
async fn test_servo_set_then_status_roundtrip() {
    let master = master_with(default_bus());

    let ack = master.execute_line("SERVO SET 120").await;
    assert_eq!(ack.as_str(), "OK SERVO");

    let status = master.execute_line("STATUS").await;
    assert_eq!(status.as_str(), "SERVO=120 RELAY=OFF STEPPER=0");
}

#[tokio::test]
async fn test_servo_clamp_is_reflected_in_status() {
    let master = master_with(default_bus());

    let ack = master.execute_line("SERVO SET 200").await;
    assert_eq!(ack.as_str(), "OK SERVO");

    // The clamped value, never the raw input.
    let status = master.execute_line("STATUS").await;
    assert_eq!(status.as_str(), "SERVO=180 RELAY=OFF STEPPER=0");
}

#[tokio::test]
async fn test_relay_round_trip_in_order() {
    let master = master_with(default_bus());

    assert_eq!(master.execute_line("RELAY ON").await.as_str(), "OK RELAY ON");
    assert_eq!(
        master.execute_line("RELAY OFF").await.as_str(),
        "OK RELAY OFF"
    );

    let status = master.execute_line("STATUS").await;
    assert_eq!(status.as_str(), "SERVO=90 RELAY=OFF STEPPER=0");
}

#[tokio::test]
async fn test_stepper_moves_accumulate() {
    let master = master_with(default_bus());

    assert_eq!(
        master.execute_line("STEPPER MOVE 100").await.as_str(),
        "OK STEPPER"
    );
    assert_eq!(
        master.execute_line("STEPPER MOVE -40").await.as_str(),
        "OK STEPPER"
    );

    let status = master.execute_line("STATUS").await;
    assert_eq!(status.as_str(), "SERVO=90 RELAY=OFF STEPPER=60");
}

#[tokio::test]
async fn test_malformed_lines_answer_err_cmd() {
    let master = master_with(default_bus());

    assert_eq!(master.execute_line("FROBNICATE 1").await.as_str(), "ERR CMD");
    assert_eq!(master.execute_line("servo set 10").await.as_str(), "ERR CMD");
    assert_eq!(
        master.execute_line("SERVO SET abc").await.as_str(),
        "ERR CMD"
    );

    let stats = master.stats().await;
    assert_eq!(stats.parse_errors, 3);
}

#[tokio::test]
async fn test_timeout_names_the_peer_and_leaves_poll_state_alone() {
    let mut bus = default_bus();
    bus.set_offline(ACTUATOR_ADDRESS, true);
    let master = master_with(bus);

    assert_eq!(master.execute_line("SENSORS").await.as_str(), "OK SENSORS");
    assert!(master.polling_enabled().await);

    let response = master.execute_line("STATUS").await;
    assert_eq!(response.as_str(), "ERR TIMEOUT actuator");

    // Exactly one timeout, and the poller was not disturbed.
    assert!(master.polling_enabled().await);
    assert_eq!(master.stats().await.timeouts, 1);
    assert_eq!(master.transport_stats().await.timeouts, 1);
}

/// A device that answers with frames the actuator schema cannot decode.
struct GarbagePeer;

impl SimPeer for GarbagePeer {
    fn address(&self) -> u8 {
        ACTUATOR_ADDRESS
    }

    fn handle(&mut self, _request: &str) -> Option<PeerReply> {
        let mut reply = PeerReply::new();
        let _ = reply.try_push_str("SERVO=banana RELAY=OFF");
        Some(reply)
    }
}

#[tokio::test]
async fn test_undecodable_frame_answers_err_badframe() {
    let mut bus = SimBus::new();
    bus.attach(Box::new(GarbagePeer));
    bus.attach(Box::new(SensorHubPeer::with_readings(23.4, 41.0, 512)));
    let master = master_with(bus);

    let response = master.execute_line("STATUS").await;
    assert_eq!(response.as_str(), "ERR BADFRAME actuator");
    assert_eq!(master.stats().await.bad_frames, 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let master = master_with(default_bus());

    // STOP with polling never enabled acks exactly like an active one.
    assert_eq!(master.execute_line("STOP").await.as_str(), "OK STOP");

    assert_eq!(master.execute_line("SENSORS").await.as_str(), "OK SENSORS");
    assert_eq!(master.execute_line("STOP").await.as_str(), "OK STOP");
    assert_eq!(master.execute_line("STOP").await.as_str(), "OK STOP");
    assert!(!master.polling_enabled().await);
}

#[tokio::test]
async fn test_poll_tick_disabled_by_default() {
    let master = master_with(default_bus());
    assert_eq!(master.poll_tick().await, PollOutcome::Disabled);
}

#[tokio::test]
async fn test_poll_tick_reports_sensor_fields() {
    let master = master_with(default_bus());
    master.execute_line("SENSORS").await;

    let outcome = master.poll_tick().await;
    let PollOutcome::Report(line) = &outcome else {
        panic!("expected a report, got {:?}", outcome);
    };
    assert_eq!(line.as_str(), "T=23.4 H=41.0 P=512 C=none");

    let stats = master.stats().await;
    assert_eq!(stats.poll.ticks, 1);
    assert_eq!(stats.poll.reports, 1);
    assert!(master.last_poll().await.is_some());
}

#[tokio::test]
async fn test_poll_tick_survives_sensor_timeouts() {
    let mut bus = default_bus();
    bus.set_offline(SENSOR_HUB_ADDRESS, true);
    let master = master_with(bus);
    master.execute_line("SENSORS").await;

    // The tick is skipped, not fatal; polling stays enabled.
    assert_eq!(master.poll_tick().await, PollOutcome::Skipped);
    assert_eq!(master.poll_tick().await, PollOutcome::Skipped);
    assert!(master.polling_enabled().await);
    assert_eq!(master.stats().await.poll.skipped, 2);
}

#[tokio::test]
async fn test_stop_takes_effect_before_next_tick() {
    let master = master_with(default_bus());
    master.execute_line("SENSORS").await;
    assert!(matches!(master.poll_tick().await, PollOutcome::Report(_)));

    master.execute_line("STOP").await;
    assert_eq!(master.poll_tick().await, PollOutcome::Disabled);
}

#[tokio::test]
async fn test_button_marker_surfaces_exactly_once() {
    let mut actuator = ActuatorPeer::with_debounce_interval(10_000);
    actuator.press_button();

    let mut bus = SimBus::new();
    bus.attach(Box::new(actuator));
    bus.attach(Box::new(SensorHubPeer::with_readings(23.4, 41.0, 512)));
    let master = master_with(bus);

    let ack = master.execute_line("SERVO SET 10").await;
    assert_eq!(ack.as_str(), "OK SERVO +BTN PRESSED");

    // Surfaced once; gone from every later response.
    let status = master.execute_line("STATUS").await;
    assert_eq!(status.as_str(), "SERVO=10 RELAY=OFF STEPPER=0");
}

#[tokio::test]
async fn test_button_presses_coalesce_into_one_marker() {
    // No debounce window: both presses register as events, but the latch
    // coalesces them into a single surfaced marker.
    let mut actuator = ActuatorPeer::with_debounce_interval(0);
    actuator.press_button();
    actuator.press_button();

    let mut bus = SimBus::new();
    bus.attach(Box::new(actuator));
    bus.attach(Box::new(SensorHubPeer::with_readings(23.4, 41.0, 512)));
    let master = master_with(bus);

    let first = master.execute_line("RELAY ON").await;
    assert_eq!(first.as_str(), "OK RELAY ON +BTN PRESSED");

    let second = master.execute_line("RELAY OFF").await;
    assert_eq!(second.as_str(), "OK RELAY OFF");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_command_during_poll_is_serialized_not_interleaved() {
    let mut bus = default_bus();
    // Slow sensor: the poll transaction holds the bus for a while.
    bus.set_latency(SENSOR_HUB_ADDRESS, Duration::from_millis(50));
    let master = master_with(bus);
    master.execute_line("SENSORS").await;

    let poll_master = Arc::clone(&master);
    let poll_task = tokio::spawn(async move { poll_master.poll_tick().await });
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Arrives mid-poll; must queue on the bus guard, then come back clean.
    let status = master.execute_line("STATUS").await;
    assert_eq!(status.as_str(), "SERVO=90 RELAY=OFF STEPPER=0");

    // If the tick lost the scheduling race and deferred, its next slot must
    // still produce a clean report.
    let outcome = match poll_task.await.unwrap() {
        PollOutcome::Deferred => master.poll_tick().await,
        other => other,
    };
    let PollOutcome::Report(line) = &outcome else {
        panic!("expected a report, got {:?}", outcome);
    };
    assert_eq!(line.as_str(), "T=23.4 H=41.0 P=512 C=none");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_poll_tick_defers_while_operator_holds_the_bus() {
    let mut bus = default_bus();
    bus.set_latency(ACTUATOR_ADDRESS, Duration::from_millis(150));
    let master = master_with(bus);
    master.execute_line("SENSORS").await;

    let cmd_master = Arc::clone(&master);
    let cmd_task = tokio::spawn(async move { cmd_master.execute_line("STATUS").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The poller never waits on a busy bus; the tick defers.
    assert_eq!(master.poll_tick().await, PollOutcome::Deferred);
    assert!(master.stats().await.poll.deferred >= 1);

    let status = cmd_task.await.unwrap();
    assert_eq!(status.as_str(), "SERVO=90 RELAY=OFF STEPPER=0");
}
