//! Live Scope terminal front-end
//!
//! Captures from an input device and draws a one-line level meter of the
//! rolling window on every frame. Reconfiguration commands are read from
//! stdin, one per line.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_scope::{
    audio::{CaptureBackend, CpalBackend, DeviceDescriptor, SyntheticBackend},
    config::AppConfig,
    display::{rolling, FrameSink},
    Parameter, ScopeController,
};

const USAGE: &str = "usage: scope [--list] [--synthetic] [--start] [--device ID] [--config PATH]";

const HELP: &str = "\
commands:
  start | stop | status | devices | quit
  window MS        rolling window length
  rate HZ          capture sample rate
  downsample N     keep every Nth frame
  device ID        switch input device
  interval MS      refresh interval";

#[derive(Default)]
struct Args {
    list: bool,
    synthetic: bool,
    start: bool,
    device: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--list" => args.list = true,
            "--synthetic" => args.synthetic = true,
            "--start" => args.start = true,
            "--device" => args.device = Some(iter.next().context("--device needs an id")?),
            "--config" => {
                args.config = Some(PathBuf::from(iter.next().context("--config needs a path")?))
            }
            "-h" | "--help" => {
                println!("{}\n\n{}", USAGE, HELP);
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(args)
}

/// Peak/RMS bar for the current window
struct LevelMeter {
    width: usize,
}

impl FrameSink for LevelMeter {
    fn frame_ready(&mut self, snapshot: &[f32]) {
        let peak = rolling::peak(snapshot);
        let rms = rolling::rms(snapshot);

        let filled = ((peak.min(1.0)) * self.width as f32).round() as usize;
        print!(
            "\r[{}{}] peak {:.3} rms {:.3} ({} samples)",
            "#".repeat(filled),
            " ".repeat(self.width - filled),
            peak,
            rms,
            snapshot.len()
        );
        let _ = std::io::stdout().flush();
    }
}

fn print_devices(devices: &[DeviceDescriptor]) {
    println!("\n=== Available Input Devices ===");
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.display_name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

fn print_status(scope: &ScopeController) {
    let config = scope.config();
    let stats = scope.queue_stats();
    let session = scope.session();
    println!(
        "\nsession {} | device {} | {} Hz / {} | window {} ms ({} samples) | every {} ms | queue {}/{} dropped {} ({:.1}%) | frames {}",
        scope.session_state(),
        scope
            .bound_device()
            .map(|d| d.id.as_str())
            .unwrap_or("default"),
        config.sample_rate,
        config.downsample_factor,
        config.window_length_ms,
        scope.display_len(),
        config.refresh_interval_ms,
        stats.len,
        stats.capacity,
        stats.dropped,
        stats.drop_rate() * 100.0,
        scope.frames_rendered(),
    );
    println!(
        "captured {} frames in {} blocks, {} stream errors, latest sample {:.4}",
        session.frames_captured(),
        session.blocks_delivered(),
        session.stream_errors(),
        scope.buffer().latest().unwrap_or(0.0),
    );
    if let Some(fault) = scope.last_fault() {
        println!("last fault: {}", fault);
    }
}

/// Returns false when the user asked to quit
fn handle_command(scope: &mut ScopeController, line: &str) -> bool {
    let mut parts = line.trim().splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();

    let result = match command {
        "" => Ok(()),
        "quit" | "exit" => return false,
        "start" => scope.start(),
        "stop" => {
            scope.stop();
            Ok(())
        }
        "status" => {
            print_status(scope);
            Ok(())
        }
        "devices" => {
            print_devices(&scope.list_devices());
            Ok(())
        }
        "help" => {
            println!("\n{}", HELP);
            Ok(())
        }
        other => other
            .parse::<Parameter>()
            .map_err(live_scope::Error::from)
            .and_then(|parameter| scope.apply(parameter, arg)),
    };

    if let Err(e) = result {
        println!("\nerror ({:?}): {}", e.kind(), e);
    }
    true
}

fn render_interval(period: Duration) -> Interval {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticks
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let app_config = match &args.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::load().context("loading config")?,
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| app_config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let backend: Arc<dyn CaptureBackend> = if args.synthetic {
        Arc::new(SyntheticBackend::new())
    } else {
        Arc::new(CpalBackend::new())
    };
    tracing::info!(backend = backend.name(), "Starting Live Scope");

    if args.list {
        print_devices(&backend.list_devices());
        return Ok(());
    }

    let mut capture = app_config.capture.clone();
    if let Some(device) = args.device {
        capture.device_id = Some(device);
    }

    let mut scope = ScopeController::new(backend, capture, app_config.queue.capacity)?;
    if args.start {
        if let Err(e) = scope.start() {
            tracing::error!("Failed to start capture: {}", e);
        }
    }
    println!("{}", HELP);

    let mut meter = LevelMeter { width: 40 };
    let mut period = scope.refresh_interval();
    let mut ticks = render_interval(period);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                scope.tick(&mut meter);
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => {
                        if !handle_command(&mut scope, &line) {
                            break;
                        }
                    }
                    None => stdin_open = false,
                }
                // New interval applies from the next cycle
                if scope.refresh_interval() != period {
                    period = scope.refresh_interval();
                    ticks = render_interval(period);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    scope.stop();
    println!();
    tracing::info!("Live Scope stopped");
    Ok(())
}
