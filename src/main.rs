use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;

use traffic_control::control::{write_atomic, Action, ApiPaths, CommandFile, ControlConfig};
use traffic_control::simulation::{LightId, LightKey, TrafficSystem, Vehicle, MANAGER_ID};

#[derive(Parser)]
#[command(name = "traffic_control")]
#[command(about = "Traffic lights under file-based external control")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Directory shared with the external controller
    #[arg(long, env = "TRAFFIC_BASE_DIR", global = true)]
    base_dir: Option<PathBuf>,

    /// JSON file with control settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo scene headless (the default)
    Run(RunArgs),
    /// Write a command into an inbox, like an external controller would
    Send(SendArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Number of ticks to run; 0 runs until killed
    #[arg(long, default_value = "600")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Sleep for each tick's delta so external controllers see real time
    #[arg(long)]
    realtime: bool,

    /// Seed for vehicle triggers and chaos runs
    #[arg(long)]
    seed: Option<u64>,

    /// Run without polling commands or writing status files
    #[arg(long)]
    no_api: bool,

    /// Seconds between periodic status writes
    #[arg(long)]
    status_interval: Option<f32>,

    /// Seconds between command polls
    #[arg(long)]
    command_interval: Option<f32>,

    /// Vehicles reaching a light per simulated second
    #[arg(long, default_value = "0.5")]
    vehicle_rate: f64,

    /// Simulated seconds between printed summaries
    #[arg(long, default_value = "5.0")]
    summary_interval: f32,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            ticks: 600,
            delta: 0.1,
            realtime: false,
            seed: None,
            no_api: false,
            status_interval: None,
            command_interval: None,
            vehicle_rate: 0.5,
            summary_interval: 5.0,
        }
    }
}

#[derive(Args)]
struct SendArgs {
    /// Light id, or `manager` for system-wide commands
    #[arg(long)]
    target: String,

    /// set_status, set_mode, set_duration, set_manual_status, chaos_mode, all_red or restore_all
    #[arg(long)]
    action: String,

    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    mode: Option<String>,

    #[arg(long, default_value = "0")]
    duration: f32,

    /// Defaults to the current time in milliseconds
    #[arg(long)]
    timestamp: Option<i64>,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "warn,traffic_control=debug"
    } else {
        "warn,traffic_control=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match &cli.command {
        Some(Commands::Run(args)) => run_headless(&cli, args),
        Some(Commands::Send(args)) => send_command(&cli, args),
        None => run_headless(&cli, &RunArgs::default()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<ControlConfig> {
    let mut config = match &cli.config {
        Some(path) => ControlConfig::load(path)?,
        None => ControlConfig::default(),
    };
    if let Some(base_dir) = &cli.base_dir {
        config.base_dir = base_dir.clone();
    }
    Ok(config)
}

/// A vehicle that shows up at a random light
struct DemoVehicle {
    name: String,
    turning: bool,
    waiting_at: Option<LightId>,
}

impl Vehicle for DemoVehicle {
    fn is_turning_across_traffic(&self) -> bool {
        self.turning
    }

    fn assign_traffic_light(&mut self, light: &LightId) {
        self.waiting_at = Some(light.clone());
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Run the demo scene in headless mode (no graphics)
fn run_headless(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut config = load_config(cli)?;
    if args.no_api {
        config.enable_api_control = false;
    }
    if let Some(interval) = args.status_interval {
        config.status_update_interval = interval;
    }
    if let Some(interval) = args.command_interval {
        config.command_check_interval = interval;
    }
    anyhow::ensure!(args.delta > 0.0, "--delta must be positive");

    let mut system = match args.seed {
        Some(seed) => TrafficSystem::new_with_seed(config, seed),
        None => TrafficSystem::new(config),
    };
    system.build_demo_scene();
    system.start();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    let light_keys: Vec<LightKey> = system.lights().map(|light| light.key).collect();
    let trigger_chance = (args.vehicle_rate * f64::from(args.delta)).clamp(0.0, 1.0);

    println!("Running traffic lights in headless mode...");
    println!("Ticks: {}, Delta: {}s", args.ticks, args.delta);
    println!(
        "Base directory: {}",
        system.config().base_dir.display()
    );
    println!();

    let mut tick: u32 = 0;
    let mut vehicles_spawned: u32 = 0;
    let mut priority_requests: u32 = 0;
    let mut next_summary = args.summary_interval;

    while args.ticks == 0 || tick < args.ticks {
        tick += 1;

        if rng.random_bool(trigger_chance) {
            if let Some(key) = light_keys.choose(&mut rng).copied() {
                vehicles_spawned += 1;
                let mut vehicle = DemoVehicle {
                    name: format!("car_{}", vehicles_spawned),
                    turning: rng.random_bool(0.4),
                    waiting_at: None,
                };
                if system.vehicle_entered(key, &mut vehicle) {
                    priority_requests += 1;
                }
            }
        }

        system.tick(args.delta);

        if args.summary_interval > 0.0 && system.time() >= next_summary {
            println!("--- After tick {} ({:.1}s simulated time) ---", tick, system.time());
            system.print_summary();
            println!();
            next_summary += args.summary_interval;
        }

        if args.realtime {
            std::thread::sleep(Duration::from_secs_f32(args.delta));
        }
    }

    system.shutdown();

    info!("=== SIMULATION COMPLETE ===");
    info!("Elapsed time: {:.2}s", system.time());
    info!("Total ticks: {}", tick);
    info!("Vehicles at lights: {}", vehicles_spawned);
    info!("Priority requests: {}", priority_requests);
    info!("Total lights: {}", system.registry().len());
    info!("Status writes: {}", system.status_sequence());

    println!("=== Final State ===");
    system.print_summary();
    Ok(())
}

/// Write one command file atomically
fn send_command(cli: &Cli, args: &SendArgs) -> Result<()> {
    let config = load_config(cli)?;
    let action: Action = args.action.parse()?;
    if action.is_manager_action() != (args.target == MANAGER_ID) {
        warn!(
            "Inbox {} does not accept {}; the command will be discarded",
            args.target, action
        );
    }
    let paths = ApiPaths::prepare(&config)?;

    let command = CommandFile {
        action: action.as_str().to_string(),
        status: args.status.clone(),
        mode: args.mode.clone(),
        duration: args.duration,
        timestamp: args
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    };
    let json = serde_json::to_vec_pretty(&command).context("Failed to serialize command")?;
    let path = paths.command_file(&args.target);
    write_atomic(&path, &json)?;

    println!(
        "Wrote {} (timestamp {}) to {}",
        action,
        command.timestamp,
        path.display()
    );
    Ok(())
}
