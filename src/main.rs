//! Binary entrypoint for the valvelink diagnostics CLI.
//!
//! Commands:
//! - `init` - create a starter `config.toml`
//! - `status` - print the endpoint status table (or `--json`)
//! - `set <address> <valve> on|off` - toggle one valve bit
//! - `outputs <address> <byte>` - command a full output byte
//! - `reset` - reset the radio master
//! - `netconfig` - dump the device's network context as JSON
//!
//! See the library crate docs for module-level details: `valvelink::`.
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use tokio::time::{sleep, Duration};

use valvelink::config::Config;
use valvelink::radio::transport::RainSensorKind;
use valvelink::radio::RadioBridge;
use valvelink::stations::StationMap;

#[derive(Parser)]
#[command(name = "valvelink")]
#[command(about = "Radio bridge for wireless valve-controller endpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum SwitchState {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init,
    /// Print the endpoint status table
    Status {
        /// Emit machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Turn one valve on or off, preserving sibling valves on the endpoint
    Set {
        /// Endpoint address (decimal or 0xHEX)
        #[arg(value_parser = parse_u32)]
        address: u32,
        /// Valve bit index, 0..7
        valve: u8,
        #[arg(value_enum)]
        state: SwitchState,
    },
    /// Command a full output byte for an endpoint
    Outputs {
        /// Endpoint address (decimal or 0xHEX)
        #[arg(value_parser = parse_u32)]
        address: u32,
        /// Output bitmask (decimal or 0xHEX)
        #[arg(value_parser = parse_u8)]
        byte: u8,
    },
    /// Reset the radio master and invalidate the status cache
    Reset,
    /// Dump the device's persistent network context as JSON
    Netconfig,
    /// Configure an endpoint's rain-sensor wiring
    RainSensor {
        /// Endpoint address (decimal or 0xHEX)
        #[arg(value_parser = parse_u32)]
        address: u32,
        #[arg(value_enum)]
        kind: RainSensorArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RainSensorArg {
    None,
    NormallyOpen,
    NormallyClosed,
}

impl From<RainSensorArg> for RainSensorKind {
    fn from(arg: RainSensorArg) -> Self {
        match arg {
            RainSensorArg::None => RainSensorKind::NotConnected,
            RainSensorArg::NormallyOpen => RainSensorKind::NormallyOpen,
            RainSensorArg::NormallyClosed => RainSensorKind::NormallyClosed,
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    parse_u32(s).and_then(|v| u8::try_from(v).map_err(|_| format!("'{}' exceeds one byte", s)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Init) {
        Config::create_default(&cli.config).await?;
        println!("Wrote default configuration to {}", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(&config, cli.verbose);
    info!("valvelink v{}", env!("CARGO_PKG_VERSION"));

    let radio = RadioBridge::connect(&config)?;
    let stations = StationMap::from_config(&config.stations);

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Status { json } => {
            let endpoints = radio.get_endpoints().await;
            if json {
                let occupied: Vec<_> = endpoints.iter().filter(|ep| ep.occupied()).collect();
                println!("{}", serde_json::to_string_pretty(&occupied)?);
            } else {
                println!(
                    "{:<12} {:>4} {:>5} {:>5} {:>8} {:>7} {:>6} {:>5} {:>5}  name",
                    "address", "lid", "link", "rain", "outputs", "valves", "volts", "up", "down"
                );
                for ep in endpoints.iter().filter(|ep| ep.occupied()) {
                    let outputs = format!("{:#04x}", ep.output_state);
                    println!(
                        "{:#012x} {:>4} {:>5} {:>5} {:>8} {:>7} {:>6.2} {:>5} {:>5}  {}",
                        ep.address,
                        ep.link_id,
                        ep.link_ok,
                        ep.rain_sensor_active,
                        outputs,
                        ep.valve_count,
                        ep.voltage(),
                        ep.rssi_uplink,
                        ep.rssi_downlink,
                        stations.endpoint_name(ep.address).unwrap_or(""),
                    );
                }
            }
        }
        Commands::Set {
            address,
            valve,
            state,
        } => {
            radio
                .set_output(address, valve, matches!(state, SwitchState::On))
                .await;
            wait_for_debounce(&config).await;
        }
        Commands::Outputs { address, byte } => {
            radio.set_endpoint_output(address, byte).await;
            wait_for_debounce(&config).await;
        }
        Commands::Reset => {
            radio.reset().await;
            println!("Device reset issued");
        }
        Commands::Netconfig => {
            let context = radio.netconfig().await?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        Commands::RainSensor { address, kind } => {
            radio.set_rain_sensor(address, kind.into()).await?;
            println!("Rain sensor type set for {:#010x}", address);
        }
    }

    Ok(())
}

/// Debounced writes fire after the quiet period; the process must outlive the
/// window or the command is cancelled unsent.
async fn wait_for_debounce(config: &Config) {
    sleep(Duration::from_millis(config.timing.write_debounce_ms + 50)).await;
}

fn init_logging(config: &Config, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let level = match verbosity {
        0 => config
            .logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let file = config.logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
            .map(|f| std::sync::Mutex::new(f))
    });
    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());
        if let Some(file) = &file {
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
        }
        writeln!(fmt, "{}", line)
    });
    builder.init();
}
