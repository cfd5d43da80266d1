//! EMG arm controller
//!
//! Reads EMG frames from the acquisition board, detects muscle bursts and
//! drives the arm with one command symbol per accepted burst.

mod monitor;
mod serial;
mod session;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use emg_core::{MonotonicClock, SteppedClock, Transport};
use emg_processing::{ConfigProfile, SessionConfig};
use emg_simulation::{presets, SimulatedTransport, SimulatorConfig};
use serial::{SerialConfig, SerialTransport};
use session::{start_session, SessionCommand, SessionHandle};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Profile {
    SixChannelArm,
    FiveChannelThreaded,
    FiveChannelCrossed,
}

impl From<Profile> for ConfigProfile {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::SixChannelArm => ConfigProfile::SixChannelArm,
            Profile::FiveChannelThreaded => ConfigProfile::FiveChannelThreaded,
            Profile::FiveChannelCrossed => ConfigProfile::FiveChannelCrossed,
        }
    }
}

/// Drive a robotic arm from EMG bursts.
#[derive(Debug, Parser)]
#[command(name = "emg-controller", version, about = "Detect EMG bursts and drive the arm")]
struct Cli {
    /// Serial port of the board, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long, short)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Built-in channel layout.
    #[arg(long, value_enum, default_value = "six-channel-arm")]
    profile: Profile,

    /// JSON session configuration; overrides --profile.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write the effective configuration as JSON and exit.
    #[arg(long)]
    export_config: Option<PathBuf>,

    /// Send a newline after every command symbol.
    #[arg(long)]
    newline: bool,

    /// Use the built-in board simulator instead of a serial port.
    #[arg(long)]
    simulate: bool,

    /// Simulator scenario.
    #[arg(long, default_value = "Elbow then wrist")]
    scenario: String,

    /// Simulator seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Run the simulator as fast as possible on simulated time.
    #[arg(long)]
    fast: bool,

    /// Console monitor refresh rate in Hz (0 disables).
    #[arg(long, default_value_t = 10.0)]
    monitor_hz: f64,

    /// Session summary JSON written on exit.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "emg_processing=trace"; defaults to RUST_LOG or info.
    #[arg(long)]
    log_level: Option<String>,

    /// List serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SessionConfig::for_profile(cli.profile.into()),
    };
    if cli.newline {
        config.command_terminator = Some('\n');
    }
    config.validate().context("invalid session configuration")?;
    Ok(config)
}

fn simulator_config(cli: &Cli, config: &SessionConfig) -> anyhow::Result<SimulatorConfig> {
    let Some((_, patterns)) = presets()
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&cli.scenario))
    else {
        let known: Vec<&str> = presets().iter().map(|(name, _)| *name).collect();
        bail!("unknown scenario '{}', expected one of {:?}", cli.scenario, known);
    };

    Ok(SimulatorConfig {
        sampling_rate: config.sampling_rate,
        channel_count: config.channel_count(),
        patterns,
        powerline_freq: Some(config.notch.frequency),
        seed: cli.seed,
        ..Default::default()
    })
}

fn launch(cli: &Cli, config: SessionConfig) -> anyhow::Result<SessionHandle> {
    let transport: Box<dyn Transport> = if cli.simulate {
        let sim = simulator_config(cli, &config)?;
        Box::new(SimulatedTransport::new(sim, !cli.fast).context("starting simulator")?)
    } else {
        let Some(port) = &cli.port else {
            bail!("no serial port given; use --port, --simulate or --list-ports");
        };
        let serial = SerialConfig::new(port, cli.baud);
        Box::new(SerialTransport::open(&serial).context("opening the board link")?)
    };

    let handle = if cli.simulate && cli.fast {
        let clock = SteppedClock::per_sample(config.sampling_rate);
        start_session(config, transport, clock)
    } else {
        start_session(config, transport, MonotonicClock::start())
    };
    Ok(handle?)
}

/// Forward stdin lines from a plain thread so a pending read never holds
/// up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Operator console: stdin commands and Ctrl-C
async fn operate(handle: &SessionHandle) -> anyhow::Result<()> {
    let commands = handle.command_handle();
    let mut input = spawn_stdin_reader();
    let mut stdin_open = true;

    println!("Commands: z/reset = reset arm, q/quit = stop (Ctrl-C also stops)");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                tracing::info!("Interrupted");
                return Ok(());
            }
            line = input.recv(), if stdin_open => {
                match line {
                    Some(line) => match line.trim().to_ascii_lowercase().as_str() {
                        "z" | "reset" => {
                            if commands.send(SessionCommand::Reset).await.is_err() {
                                return Ok(());
                            }
                        }
                        "q" | "quit" => return Ok(()),
                        "" => {}
                        other => println!("Unknown command '{}'", other),
                    },
                    None => stdin_open = false,
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if cli.list_ports {
        let ports = serial::available_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;

    if let Some(path) = &cli.export_config {
        std::fs::write(path, config.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    println!("Starting EMG controller: {} ({})", config.name, config.profile.description());
    let labels: Vec<String> = config.channels.iter().map(|c| c.label.clone()).collect();

    let handle = launch(&cli, config)?;
    tracing::info!(
        session = %handle.id(),
        "Session started at {}",
        handle.started_at().format("%Y-%m-%d %H:%M:%S UTC")
    );

    let monitor = if cli.monitor_hz > 0.0 {
        Some(tokio::spawn(monitor::run_monitor(
            labels,
            handle.subscribe(),
            handle.stats(),
            cli.monitor_hz,
        )))
    } else {
        None
    };

    operate(&handle).await?;

    let summary = handle.stop().await?;
    if let Some(monitor) = monitor {
        // The monitor ends once the session drops its publishers.
        let _ = monitor.await;
    }

    println!(
        "Session {} ended: {} frames, {} dropped, {} commands sent, {} failed, {} resets",
        summary.id,
        summary.stats.pipeline.frames_processed,
        summary.stats.pipeline.frames_dropped.total(),
        summary.stats.dispatch.sent,
        summary.stats.dispatch.failed,
        summary.stats.dispatch.resets,
    );

    if let Some(path) = &cli.summary {
        let json = serde_json::to_string_pretty(&summary).context("serializing session summary")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
