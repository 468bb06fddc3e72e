//! CLI Entry Point for vibration_profile
//!
//! Provides a command-line interface for:
//! - Running a vibrations sweep against the simulated machine and exporting the recordings
//! - Printing the sweep plan (angles, speeds, passes) without moving anything
//! - Printing the effective configuration
//!
//! # Usage
//!
//! ```bash
//! vibration_profile run --config config/vibration_profile.toml --max-speed 150 --output data/run1
//! vibration_profile plan --kinematics corexy --speed-increment 10
//! VIBRATION_PROFILE_SWEEP__ACCEL=4000 vibration_profile config
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use vibration_profile::config::{AppConfig, DEFAULT_CONFIG_PATH};
use vibration_profile::data::CsvExportPipeline;
use vibration_profile::hardware::mock::{simulated_machine, EventLog};
use vibration_profile::logging::{self, OutputFormat, TracingConfig};
use vibration_profile::procedures::{plan_sweep, MotionSegment, VibrationsProfile};

#[derive(Parser)]
#[command(name = "vibration_profile")]
#[command(about = "Machine vibrations profile: synchronized motion and accelerometer sweeps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sweep on the simulated machine and export the recordings as CSV
    Run {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Output directory (overrides export.output_dir)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the angles and speeds a sweep would measure
    Plan {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Print the configuration after merging the file, environment and flags
    Config {
        #[command(flatten)]
        sweep: SweepArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct SweepArgs {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Pattern size (mm)
    #[arg(long)]
    size: Option<f64>,

    /// Height of the pattern (mm)
    #[arg(long)]
    z_height: Option<f64>,

    /// Highest tested speed (mm/s)
    #[arg(long)]
    max_speed: Option<f64>,

    /// Step between tested speeds (mm/s)
    #[arg(long)]
    speed_increment: Option<f64>,

    /// Test acceleration (mm/s²)
    #[arg(long)]
    accel: Option<u32>,

    /// Speed of positioning moves (mm/s)
    #[arg(long)]
    travel_speed: Option<f64>,

    /// Accelerometer to use for every angle
    #[arg(long)]
    accel_chip: Option<String>,

    /// Kinematics of the simulated machine (cartesian, corexy, corexz)
    #[arg(long)]
    kinematics: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, default_value = "compact")]
    log_format: OutputFormat,
}

impl SweepArgs {
    /// Configuration file with the command-line overrides applied
    fn load(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_from(&self.config)?;
        let sweep = &mut config.sweep;

        if let Some(size) = self.size {
            sweep.size = size;
        }
        if let Some(z_height) = self.z_height {
            sweep.z_height = z_height;
        }
        if let Some(max_speed) = self.max_speed {
            sweep.max_speed = max_speed;
        }
        if let Some(increment) = self.speed_increment {
            sweep.speed_increment = increment;
        }
        if let Some(accel) = self.accel {
            sweep.accel = accel;
        }
        if let Some(travel_speed) = self.travel_speed {
            sweep.travel_speed = travel_speed;
        }
        if let Some(chip) = &self.accel_chip {
            sweep.accel_chip = Some(chip.clone());
        }
        if let Some(kinematics) = &self.kinematics {
            config.machine.kinematics = kinematics.clone();
        }
        Ok(config)
    }

    fn init_logging(&self, config: &AppConfig) -> Result<()> {
        let tracing_config =
            TracingConfig::from_app_config(config)?.with_format(self.log_format);
        logging::init(tracing_config)?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { sweep, output } => run_sweep(sweep, output).await,
        Commands::Plan { sweep } => print_plan(sweep),
        Commands::Config { sweep } => {
            print!("{}", sweep.load()?.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_sweep(args: SweepArgs, output: Option<PathBuf>) -> Result<()> {
    let config = args.load()?;
    args.init_logging(&config)?;
    config.validate()?;

    tracing::info!(name = %config.application.name, "Starting vibrations profile");

    let machine = simulated_machine(&config.machine, EventLog::new())?;
    let pipeline = CsvExportPipeline::new(output.unwrap_or(config.export.output_dir));

    let (mut procedure, mut progress) = VibrationsProfile::new(config.sweep);
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = progress.borrow_and_update().clone();
            tracing::debug!(
                state = ?p.state,
                step = p.current_step,
                total = p.total_steps,
                "{:.0}% {}",
                p.overall_progress * 100.0,
                p.message
            );
        }
    });

    let report = procedure.run(&machine, &pipeline).await;
    drop(procedure);
    if let Err(e) = watcher.await {
        tracing::warn!("Progress watcher ended abnormally: {}", e);
    }

    let report = report?;
    println!("{}", report.summary());
    println!("Recordings written to {}", pipeline.output_dir().display());
    Ok(())
}

fn print_plan(args: SweepArgs) -> Result<()> {
    let config = args.load()?;
    args.init_logging(&config)?;

    let (profile, plan) = plan_sweep(&config.sweep, &config.machine.kinematics)?;
    let sweep = &config.sweep;

    println!(
        "{} kinematics: angles {:?}, {} speeds and {} back-and-forth passes per angle",
        profile.family.tag().to_uppercase(),
        profile.angles,
        plan.len(),
        plan.total_passes()
    );
    println!("{:>10} {:>8} {:>7} {:>12}", "speed", "factor", "passes", "segment_mm");

    let mut motion_secs = 0.0;
    for sample in plan.samples() {
        let segment = MotionSegment::around(
            Default::default(),
            sweep.size,
            0.0,
            sample.segment_factor,
            sample.speed,
        );
        motion_secs += 2.0 * f64::from(sample.repetitions) * segment.length() / sample.speed;
        println!(
            "{:>10.2} {:>8.3} {:>7} {:>12.2}",
            sample.speed,
            sample.segment_factor,
            sample.repetitions,
            segment.length()
        );
    }

    println!(
        "Test motion per angle: {:.0}s, total: {:.0}s (excluding positioning and settling)",
        motion_secs,
        motion_secs * profile.angles.len() as f64
    );
    Ok(())
}
