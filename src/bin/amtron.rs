//! AMTRON command line tool
//!
//! Usage: amtron --host 192.168.1.50 read
//!        amtron --config amtron.yaml watch --interval 15
//!        amtron --host 192.168.1.50 set-current 10

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use figment::providers::Serialized;
use serde::Serialize;
use tracing::info;

use amtron_modbus::{
    logging, validate_connection, ChargerConfig, ControlMediator, Coordinator, ModbusTcpClient,
    PollScheduler, Snapshot, SnapshotAcquirer,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// MENNEKES AMTRON Modbus TCP client
#[derive(Parser)]
#[command(name = "amtron")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Charger IP address or hostname
    #[arg(long, global = true, env = "AMTRON_HOST")]
    host: Option<String>,

    /// Modbus TCP port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Modbus unit id (1-247)
    #[arg(long, global = true)]
    unit_id: Option<u8>,

    /// Configuration file (toml, yaml or json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Trace every Modbus frame as hex
    #[arg(long, global = true)]
    packet_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the charger accepts a TCP connection
    Check,

    /// Run one poll cycle and print the snapshot
    Read {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Poll continuously and print every new snapshot
    Watch {
        /// Poll interval in seconds (5-60)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Print JSON lines instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Set the HEMS current limit in A (1-5 A pauses charging)
    SetCurrent { amps: f64 },

    /// Set the HEMS power limit in W (1-1379 W pauses charging)
    SetPower { watts: f64 },

    /// Allow charging at 16 A
    Enable,

    /// Pause charging
    Disable,
}

/// Command line values that override file and environment settings
#[derive(Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scan_interval_secs: Option<u64>,
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> Result<(), BoxError> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", snapshot);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let interval = match &cli.command {
        Commands::Watch { interval, .. } => *interval,
        _ => None,
    };
    let overrides = Overrides {
        host: cli.host.clone(),
        port: cli.port,
        unit_id: cli.unit_id,
        scan_interval_secs: interval,
    };
    let config = ChargerConfig::load_with(cli.config.as_deref(), Serialized::defaults(overrides))?;

    if let Commands::Check = cli.command {
        validate_connection(&config).await?;
        println!("Charger at {} is reachable", config.endpoint());
        return Ok(());
    }

    let client: Arc<ModbusTcpClient> = Arc::new(config.build_client());
    client.set_packet_logging(cli.packet_log).await;

    let acquirer = SnapshotAcquirer::with_limits(client, config.device_limits());
    let coordinator = Arc::new(Coordinator::new(acquirer));
    let result = run(cli.command, &config, coordinator.clone()).await;

    coordinator.shutdown().await.ok();
    result
}

async fn run(
    command: Commands,
    config: &ChargerConfig,
    coordinator: Arc<Coordinator<ModbusTcpClient>>,
) -> Result<(), BoxError> {
    let control = ControlMediator::new(coordinator.clone());

    match command {
        Commands::Check => {}
        Commands::Read { json } => {
            let snapshot = coordinator.refresh().await?;
            if let Some(report) = coordinator.last_report() {
                for degraded in &report.degraded {
                    info!("{} block used defaults: {}", degraded.kind.name(), degraded.reason);
                }
            }
            print_snapshot(&snapshot, json)?;
        }
        Commands::Watch { json, .. } => {
            let scheduler = Arc::new(PollScheduler::new(coordinator.clone(), config.scan_interval()));
            let mut updates = coordinator.subscribe();
            let runner = {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.start().await })
            };

            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let latest = updates.borrow_and_update().clone();
                        if let Some(snapshot) = latest {
                            print_snapshot(&snapshot, json)?;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted");
                        break;
                    }
                }
            }

            scheduler.stop();
            runner.await?;
        }
        Commands::SetCurrent { amps } => {
            let written = control.set_current_limit(amps).await?;
            println!("Current limit set to {} A", written);
            print_latest(&coordinator);
        }
        Commands::SetPower { watts } => {
            let written = control.set_power_limit(watts).await?;
            println!("Power limit set to {} W", written);
            print_latest(&coordinator);
        }
        Commands::Enable => {
            let written = control.enable_charging().await?;
            println!("Charging enabled at {} A", written);
            print_latest(&coordinator);
        }
        Commands::Disable => {
            control.disable_charging().await?;
            println!("Charging paused");
            print_latest(&coordinator);
        }
    }
    Ok(())
}

fn print_latest(coordinator: &Coordinator<ModbusTcpClient>) {
    match coordinator.latest() {
        Some(snapshot) => println!("{}", snapshot),
        None => println!("(no snapshot: {})", coordinator.last_error().unwrap_or_default()),
    }
}
