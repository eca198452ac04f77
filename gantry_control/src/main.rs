//! # Gantry Control Binary
//!
//! Drives a multi-camera gantry rig from the command line.
//!
//! # Usage
//!
//! ```bash
//! # List ports
//! gantry ports
//!
//! # Home against the in-process emulator
//! gantry --dev home
//!
//! # Image a project on a real port
//! gantry --port /dev/ttyUSB0 --project scan.toml image
//!
//! # Jog device 1, verbose JSON logs
//! gantry --dev -v --json jog ">1G0X10" ">1G0Y5"
//! ```

use clap::{Parser, Subcommand};
use gantry_common::config::{ConfigLoader, GantryConfig, LogLevel};
use gantry_common::consts::LOOPBACK_PORT_NAME;
use gantry_common::protocol::{Action, deserialize};
use gantry_control::{
    Host, JobListener, Orchestrator, Project, ProjectFile, TracingListener, WorkType,
};
use gantry_hal::PortManager;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Gantry rig command orchestration
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(version)]
#[command(about = "Command orchestration for multi-camera gantry rigs")]
#[command(long_about = None)]
struct Args {
    /// Path to configuration file (gantry.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to project file
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Port to connect to
    #[arg(long)]
    port: Option<String>,

    /// Baud rate override
    #[arg(long)]
    baud: Option<u32>,

    /// Use the in-process rig emulator
    #[arg(long)]
    dev: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available ports
    Ports,
    /// Print a status report for every device
    Query,
    /// Release locked devices
    Unlock,
    /// Run the homing sequence
    Home,
    /// Move to the ready positions
    Ready,
    /// Image every pose set of the project
    Image,
    /// Jog with raw command lines
    Jog {
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

/// Remembers how the last job ended.
#[derive(Default)]
struct Outcome(Mutex<Option<String>>);

impl JobListener for Outcome {
    fn job_faulted(&self, kind: WorkType, reason: &str) {
        *self.0.lock() = Some(format!("{kind} job faulted: {reason}"));
    }
}

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("gantry: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GantryConfig::load(path)?,
        None => GantryConfig::default(),
    };
    if args.dev {
        config.transport.development = true;
    }
    if let Some(baud) = args.baud {
        config.transport.baud = baud;
    }
    config.validate()?;

    setup_tracing(&args, config.shared.log_level);
    info!("Gantry v{} starting...", env!("CARGO_PKG_VERSION"));

    let ports = Arc::new(PortManager::from_config(&config));
    if let Command::Ports = args.command {
        for port in ports.enumerate() {
            println!("{port}");
        }
        return Ok(());
    }

    let project = match &args.project {
        Some(path) => ProjectFile::load(path)?.into_project()?,
        None if config.transport.development => {
            Project::with_devices(config.emulator.devices.clone())
        }
        None => {
            warn!("No project given, no devices registered");
            Project::default()
        }
    };

    let port = match (&args.port, config.transport.development) {
        (Some(port), _) => port.clone(),
        (None, true) => LOOPBACK_PORT_NAME.to_string(),
        (None, false) => return Err("no port given, use --port or --dev".into()),
    };

    let orchestrator = Arc::new(Orchestrator::new(&config, ports, Host::default()));
    let outcome = Arc::new(Outcome::default());
    orchestrator
        .events()
        .register_device_listener(Arc::new(TracingListener));
    orchestrator
        .events()
        .register_job_listener(Arc::new(TracingListener));
    orchestrator.events().register_job_listener(outcome.clone());

    orchestrator.open_project(project)?;
    orchestrator.select_port(&port)?;
    orchestrator.connect()?;

    {
        let orchestrator = orchestrator.clone();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            orchestrator.cancel();
        })?;
    }

    let grace = config.engine.report_grace();
    match &args.command {
        Command::Ports => {}
        Command::Query => {
            orchestrator.query_status()?;
            std::thread::sleep(grace);
            for device in orchestrator.registry().snapshot() {
                let report = device
                    .last_response
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "no report".to_string());
                println!("{:>3}  {:<8} {}", device.id, device.status(), report);
            }
        }
        Command::Unlock => {
            orchestrator.unlock()?;
            std::thread::sleep(grace);
        }
        Command::Home => run_job(&orchestrator, |o| o.start_homing())?,
        Command::Ready => run_job(&orchestrator, |o| o.start_set_ready())?,
        Command::Image => run_job(&orchestrator, |o| o.start_imaging())?,
        Command::Jog { lines } => {
            let actions = lines
                .iter()
                .map(|l| deserialize(l))
                .collect::<Result<Vec<Action>, _>>()?;
            run_job(&orchestrator, |o| o.jog(&actions))?;
        }
    }

    orchestrator.disconnect();
    if let Some(fault) = outcome.0.lock().take() {
        return Err(fault.into());
    }
    info!("Gantry shutdown complete");
    Ok(())
}

/// Start a job and block until it ends.
fn run_job(
    orchestrator: &Orchestrator,
    start: impl FnOnce(&Orchestrator) -> Result<(), gantry_control::EngineError>,
) -> Result<(), Box<dyn std::error::Error>> {
    start(orchestrator)?;
    while !orchestrator.wait_until_idle(Duration::from_secs(1)) {
        if let Some(index) = orchestrator.current_pose_set() {
            info!(
                "Imaging pose set {}, {} packets remain",
                index,
                orchestrator.remaining_batch().len()
            );
        }
    }
    let stats = orchestrator.stats();
    info!(
        "{} serial writes, {} camera actions, avg ack {}us, max ack {}us",
        stats.serial_writes,
        stats.camera_actions,
        stats.average_ack_wait_us(),
        stats.max_ack_wait_us
    );
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, level: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
