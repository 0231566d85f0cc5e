use busmaster::peers::{ActuatorPeer, SensorHubPeer, SimBus};
use busmaster::poller;
use busmaster::{MasterConfig, Orchestrator, PeerRegistry};
use clap::{App, Arg};
use colored::*;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::warn;

const REPORT_CHANNEL_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("busmaster")
        .version("0.1.0")
        .about("Bus master console - operator commands in, device responses out")
        .arg(
            Arg::with_name("poll-interval")
                .long("poll-interval")
                .value_name("MS")
                .help("Sensor poll period in milliseconds")
                .takes_value(true)
                .default_value("2000")
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("bus-timeout")
                .long("bus-timeout")
                .value_name("MS")
                .help("Bus response timeout in milliseconds")
                .takes_value(true)
                .default_value("250")
                .validator(validate_millis),
        )
        .arg(
            Arg::with_name("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("File that sensor report lines are appended to")
                .takes_value(true)
                .default_value("sensors.txt"),
        )
        .arg(
            Arg::with_name("offline")
                .long("offline")
                .value_name("PEER")
                .help("Start with the named peer off the bus (actuator / sensor-hub)")
                .takes_value(true),
        )
        .get_matches();

    let poll_interval = matches.value_of("poll-interval").unwrap().parse::<u64>()?;
    let bus_timeout = matches.value_of("bus-timeout").unwrap().parse::<u64>()?;
    let log_path = matches.value_of("log-file").unwrap().to_string();

    let config = MasterConfig {
        bus_timeout: Duration::from_millis(bus_timeout),
        poll_interval: Duration::from_millis(poll_interval),
    };

    let mut bus = SimBus::new();
    bus.attach(Box::new(ActuatorPeer::new()));
    bus.attach(Box::new(SensorHubPeer::new()));

    if let Some(name) = matches.value_of("offline") {
        // Unknown peer names are fatal here, before anything runs.
        let registry = PeerRegistry::new()?;
        let peer = registry.lookup(name)?;
        bus.set_offline(peer.address, true);
        println!("{} {}", "⚠️  peer forced offline:".yellow(), peer.name);
    }

    let master = Arc::new(Orchestrator::new(Box::new(bus), config)?);

    let (report_tx, mut report_rx) = broadcast::channel(REPORT_CHANNEL_SIZE);
    tokio::spawn(poller::run(Arc::clone(&master), report_tx));

    // Sensor reports print to the console and land in the log file.
    tokio::spawn(async move {
        while let Ok(line) = report_rx.recv().await {
            println!("{}", line.as_str().dimmed());
            if line.starts_with("T=") {
                if let Err(err) = append_sensor_log(&log_path, &line) {
                    warn!("failed to append sensor log: {}", err);
                }
            }
        }
    });

    println!("{}", "✅ bus master ready".green());
    println!(
        "{}",
        "👉 SERVO SET <0-180> / STEPPER MOVE <n> / RELAY ON|OFF / STATUS / SENSORS / STOP"
            .dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!(">>> ");
        std::io::stdout().flush().ok();

        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response = master.execute_line(line).await;
                if response.starts_with("ERR") {
                    println!("{}", response.as_str().red());
                } else {
                    println!("{}", response.as_str().green());
                }
            }
            Ok(None) => break,
            Err(err) => {
                eprintln!("{} {}", "console read error:".red(), err);
                break;
            }
        }
    }

    println!("{}", "👋 exit".dimmed());
    Ok(())
}

fn append_sensor_log(path: &str, line: &str) -> std::io::Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{} {}", timestamp, line)
}

fn validate_millis(value: String) -> Result<(), String> {
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(()),
        _ => Err("must be a positive number of milliseconds".into()),
    }
}
