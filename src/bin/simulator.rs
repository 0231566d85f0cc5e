use busmaster::peers::{ActuatorPeer, SensorHubPeer, SensorSnapshot, SimBus};
use busmaster::poller;
use busmaster::{MasterConfig, Orchestrator};
use clap::{App, Arg};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info, warn};

const REPORT_BROADCAST_BUFFER_SIZE: usize = 256;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt::init();

    let matches = App::new("busmaster-simulator")
        .version("0.1.0")
        .about("Bus master simulator - operator protocol over TCP against simulated peers")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Operator protocol port")
                .takes_value(true)
                .default_value("8080"),
        )
        .arg(
            Arg::with_name("status-port")
                .long("status-port")
                .value_name("PORT")
                .help("Sensor node HTTP status port")
                .takes_value(true)
                .default_value("8081"),
        )
        .arg(
            Arg::with_name("poll-interval")
                .long("poll-interval")
                .value_name("MS")
                .help("Sensor poll period in milliseconds")
                .takes_value(true)
                .default_value("2000"),
        )
        .arg(
            Arg::with_name("bus-timeout")
                .long("bus-timeout")
                .value_name("MS")
                .help("Bus response timeout in milliseconds")
                .takes_value(true)
                .default_value("250"),
        )
        .get_matches();

    let port = matches.value_of("port").unwrap().parse::<u16>()?;
    let status_port = matches.value_of("status-port").unwrap().parse::<u16>()?;
    let poll_interval = matches.value_of("poll-interval").unwrap().parse::<u64>()?;
    let bus_timeout = matches.value_of("bus-timeout").unwrap().parse::<u64>()?;

    let config = MasterConfig {
        bus_timeout: Duration::from_millis(bus_timeout),
        poll_interval: Duration::from_millis(poll_interval),
    };

    let mut actuator = ActuatorPeer::new();
    let button_tx = actuator.button_channel();

    let mut sensor = SensorHubPeer::new();
    let snapshot_rx = sensor.snapshot_channel();
    let clap_tx = sensor.clap_channel();

    let mut bus = SimBus::new();
    bus.attach(Box::new(actuator));
    bus.attach(Box::new(sensor));

    let master = Arc::new(Orchestrator::new(Box::new(bus), config)?);

    // Physical-world events come in on the simulator's own stdin: `btn`
    // presses the actuator's button, `clap` claps at the sensor node.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "btn" => {
                    let _ = button_tx.send(());
                }
                "clap" => {
                    let _ = clap_tx.send(());
                }
                "" => {}
                other => warn!("unknown world event `{}` (try: btn, clap)", other),
            }
        }
    });

    let (report_tx, _) = broadcast::channel(REPORT_BROADCAST_BUFFER_SIZE);
    tokio::spawn(poller::run(Arc::clone(&master), report_tx.clone()));

    tokio::spawn(async move {
        if let Err(err) = serve_status(status_port, snapshot_rx).await {
            error!("status endpoint error: {}", err);
        }
    });

    serve_operators(port, master, report_tx).await
}

async fn serve_operators(
    port: u16,
    master: Arc<Orchestrator>,
    report_tx: broadcast::Sender<String>,
) -> Result<(), BoxError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("operator server listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("operator connected: {}", addr);
                let client_master = Arc::clone(&master);
                let client_reports = report_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(err) = handle_operator(stream, client_master, client_reports).await {
                        warn!("operator {} error: {}", addr, err);
                    }
                    info!("operator {} disconnected", addr);
                });
            }
            Err(err) => {
                error!("failed to accept connection: {}", err);
            }
        }
    }
}

async fn handle_operator(
    stream: TcpStream,
    master: Arc<Orchestrator>,
    mut reports: broadcast::Receiver<String>,
) -> Result<(), BoxError> {
    let (reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));

    // Poll reports stream to every connected operator.
    let report_writer = Arc::clone(&writer);
    let report_task = tokio::spawn(async move {
        while let Ok(line) = reports.recv().await {
            let mut guard = report_writer.lock().await;
            if guard.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if guard.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = master.execute_line(trimmed).await;
        let mut guard = writer.lock().await;
        guard.write_all(response.as_bytes()).await?;
        guard.write_all(b"\n").await?;
    }

    report_task.abort();
    Ok(())
}

/// The physical sensor node runs its own tiny web server; here the simulated
/// node serves the same `GET /status` JSON from its latest snapshot.
async fn serve_status(
    port: u16,
    snapshot_rx: watch::Receiver<SensorSnapshot>,
) -> Result<(), BoxError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("sensor status endpoint listening on port {}", port);

    loop {
        let (mut stream, _) = listener.accept().await?;
        let rx = snapshot_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = answer_status(&mut stream, &rx).await {
                warn!("status client error: {}", err);
            }
        });
    }
}

async fn answer_status(
    stream: &mut TcpStream,
    snapshot_rx: &watch::Receiver<SensorSnapshot>,
) -> Result<(), BoxError> {
    let mut buf = [0u8; 512];
    let n = stream.read(&mut buf).await?;
    let head = String::from_utf8_lossy(&buf[..n]);

    let (status_line, body) = if head.starts_with("GET /status") {
        let snapshot = *snapshot_rx.borrow();
        ("HTTP/1.1 200 OK", serde_json::to_string(&snapshot)?)
    } else {
        (
            "HTTP/1.1 404 Not Found",
            String::from(r#"{"error":"not found"}"#),
        )
    };

    let response = format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await.ok();
    Ok(())
}
