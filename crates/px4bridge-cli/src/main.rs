//! `px4bridge` – PX4 → ROS 2 telemetry bridge.
//!
//! Runs the IMU and odometry bridges on an in-process topic bus and exposes
//! the bus to external processes through a rosbridge WebSocket gateway.
//!
//! ```text
//! px4bridge [run|imu|odom|save-config|help]
//! ```
//!
//! Ctrl-C stops every bridge; each one logs its counters on the way out.

mod config;

use std::process::ExitCode;

use colored::Colorize;
use px4bridge_middleware::{RosbridgeGateway, TopicBus};
use px4bridge_runtime::{NodeStats, telemetry};
use px4bridge_types::BridgeError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Every bridge enabled in the config, plus the gateway.
    Run,
    Imu,
    Odom,
    SaveConfig,
    Help,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self, String> {
        match arg {
            None | Some("run") => Ok(Command::Run),
            Some("imu") => Ok(Command::Imu),
            Some("odom") => Ok(Command::Odom),
            Some("save-config") => Ok(Command::SaveConfig),
            Some("help" | "-h" | "--help") => Ok(Command::Help),
            Some(other) => Err(format!("unknown command '{other}'")),
        }
    }

    fn runs_imu(self, cfg: &Config) -> bool {
        match self {
            Command::Run => cfg.imu.enabled,
            Command::Imu => true,
            _ => false,
        }
    }

    fn runs_odometry(self, cfg: &Config) -> bool {
        match self {
            Command::Run => cfg.odometry.enabled,
            Command::Odom => true,
            _ => false,
        }
    }
}

fn main() -> ExitCode {
    let _otel_guard = telemetry::init_tracing("px4bridge");

    let arg = std::env::args().nth(1);
    let command = match Command::parse(arg.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            print_usage();
            return ExitCode::from(2);
        }
    };
    if command == Command::Help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => {
            println!("  Config: {}", config::config_path().display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    if command == Command::SaveConfig {
        return match config::save(&cfg) {
            Ok(path) => {
                println!("  {} Config saved to {}", "✓".green().bold(), path.display().to_string().bold());
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    // ── Shutdown signal ───────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping bridges …".yellow().bold());
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process with a signal instead");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(command, cfg, shutdown_rx)) {
        Ok(stats) => {
            print_summary(&stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Bridge error".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge host
// ─────────────────────────────────────────────────────────────────────────────

async fn run(
    command: Command,
    cfg: Config,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Vec<(String, NodeStats)>, BridgeError> {
    let bus = TopicBus::new();
    let mut nodes: Vec<(String, JoinHandle<NodeStats>)> = Vec::new();

    if command.runs_imu(&cfg) {
        let node = cfg.imu.build(&bus)?;
        nodes.push((node.name().to_string(), tokio::spawn(node.spin(shutdown.clone()))));
    }
    if command.runs_odometry(&cfg) {
        let node = cfg.odometry.build(&bus)?;
        nodes.push((node.name().to_string(), tokio::spawn(node.spin(shutdown.clone()))));
    }
    if nodes.is_empty() {
        warn!("no bridge enabled; set `enabled = true` under [imu] or [odometry]");
        return Ok(Vec::new());
    }

    if cfg.gateway.enabled {
        let gateway = RosbridgeGateway::new(bus.clone(), cfg.gateway.ingest_qos)
            .with_egress_qos(cfg.gateway.egress_qos);
        let addr = cfg.gateway.addr;
        let gateway_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.serve(addr, gateway_shutdown).await {
                error!(addr = %addr, error = %e, "rosbridge gateway failed; bridges keep running");
            }
        });
    }

    info!(bridges = nodes.len(), topics = ?bus.topic_names(), "px4bridge running");
    let _signalled = shutdown.wait_for(|stop| *stop).await.is_ok();

    let mut stats = Vec::with_capacity(nodes.len());
    for (name, handle) in nodes {
        match handle.await {
            Ok(s) => stats.push((name, s)),
            Err(e) => error!(node = %name, error = %e, "bridge task failed"),
        }
    }
    bus.shutdown();
    Ok(stats)
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___ __ __ ____ __          _     __         "#.bold().cyan());
    println!("{}", r#"  / _ \\ \ // / // /  ___ ____(_)__/ /__ ____ "#.bold().cyan());
    println!("{}", r#" / ___/ > </_  _/ _ \/ __/ / / _  / _ `/ -_)"#.bold().cyan());
    println!("{}", r#"/_/  /_/\_\ /_//_.__/_/ /_/ \_,_/\_, /\__/ "#.bold().cyan());
    println!("{}", r#"                                /___/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "px4bridge".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  PX4 → ROS 2 telemetry bridge");
    println!();
}

fn print_usage() {
    println!("Usage: px4bridge [COMMAND]");
    println!();
    println!("Commands:");
    println!("  {}          Run every enabled bridge and the gateway (default)", "run".bold());
    println!("  {}          Run only the IMU bridge", "imu".bold());
    println!("  {}         Run only the odometry bridge", "odom".bold());
    println!("  {}  Write the effective config to {}", "save-config".bold(), config::config_path().display());
    println!("  {}         Show this message", "help".bold());
}

fn print_summary(stats: &[(String, NodeStats)]) {
    for (name, s) in stats {
        let mark = if s.dropped == 0 { "✓".green() } else { "!".yellow() };
        println!("  {mark} {} {s}", name.bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse(None), Ok(Command::Run));
        assert_eq!(Command::parse(Some("run")), Ok(Command::Run));
        assert_eq!(Command::parse(Some("imu")), Ok(Command::Imu));
        assert_eq!(Command::parse(Some("odom")), Ok(Command::Odom));
        assert_eq!(Command::parse(Some("save-config")), Ok(Command::SaveConfig));
        assert_eq!(Command::parse(Some("--help")), Ok(Command::Help));
        assert!(Command::parse(Some("fly")).is_err());
    }

    #[test]
    fn single_bridge_commands_ignore_enabled_flag() {
        let mut cfg = Config::default();
        cfg.imu.enabled = false;
        assert!(!Command::Run.runs_imu(&cfg));
        assert!(Command::Imu.runs_imu(&cfg));
        assert!(!Command::Imu.runs_odometry(&cfg));
        assert!(Command::Run.runs_odometry(&cfg));
        assert!(Command::Odom.runs_odometry(&cfg));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_and_reports_each_bridge() {
        let mut cfg = Config::default();
        cfg.gateway.enabled = false;
        let (tx, rx) = watch::channel(false);
        let host = tokio::spawn(run(Command::Run, cfg, rx));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let stats = host.await.unwrap().unwrap();
        let names: Vec<&str> = stats.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["px4_imu_bridge", "px4_to_odom_bridge"]);
        assert!(stats.iter().all(|(_, s)| *s == NodeStats::default()));
    }

    #[tokio::test]
    async fn run_with_no_bridges_returns_immediately() {
        let mut cfg = Config::default();
        cfg.imu.enabled = false;
        cfg.odometry.enabled = false;
        let (_tx, rx) = watch::channel(false);
        let stats = run(Command::Run, cfg, rx).await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn gateway_client_receives_imu_bridge_output() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut cfg = Config::default();
        cfg.odometry.enabled = false;
        cfg.gateway.addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
        let (tx, rx) = watch::channel(false);
        let host = tokio::spawn(run(Command::Run, cfg, rx));

        let mut ws = None;
        for _ in 0..50 {
            match tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}")).await {
                Ok((stream, _)) => {
                    ws = Some(stream);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        let mut ws = ws.expect("gateway accepts connections");

        ws.send(WsMessage::Text(r#"{"op":"subscribe","topic":"/imu/data"}"#.into()))
            .await
            .unwrap();
        ws.send(WsMessage::Text(
            r#"{"op":"advertise","topic":"/fmu/out/sensor_combined","type":"px4_msgs/msg/SensorCombined"}"#.into(),
        ))
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        ws.send(WsMessage::Text(
            r#"{"op":"publish","topic":"/fmu/out/sensor_combined","msg":{"timestamp":1000,"gyro_rad":[0.1,-0.2,0.05]}}"#
                .into(),
        ))
        .await
        .unwrap();

        let json = loop {
            let frame = tokio::time::timeout(Duration::from_secs(1), ws.next())
                .await
                .expect("a frame before the timeout")
                .unwrap()
                .unwrap();
            if let WsMessage::Text(text) = frame {
                let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if json["topic"] == "/imu/data" {
                    break json;
                }
            }
        };
        assert_eq!(json["op"], "publish");
        let x = json["msg"]["angular_velocity"]["x"].as_f64().unwrap();
        assert!((x - 0.1).abs() < 1e-6);

        tx.send(true).unwrap();
        let stats = host.await.unwrap().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].0, "px4_imu_bridge");
        assert_eq!(stats[0].1.received, 1);
        assert_eq!(stats[0].1.published, 1);
    }
}
