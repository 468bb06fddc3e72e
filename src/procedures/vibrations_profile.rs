//! Vibrations Profile Procedure
//!
//! Measures the vibrations produced by the motion system across a range of speeds, along
//! each principal angle of the machine's kinematics:
//! 1. Validate parameters, check the input shaper is configured, resolve the angles
//! 2. Claim the machine and override the velocity limits for the test
//! 3. Approach the test area
//! 4. For every angle and every speed, record one back-and-forth capture
//! 5. Restore the velocity limits (on every exit path) and drain the move queue
//! 6. Hand the recordings to the analysis pipeline and wait for it
//!
//! # Configuration
//!
//! ```toml
//! [sweep]
//! size = 100.0          # mm, >= 50
//! z_height = 20.0       # mm
//! max_speed = 200.0     # mm/s, >= 10
//! speed_increment = 2.0 # mm/s, >= 1
//! accel = 3000          # mm/s², >= 100
//! travel_speed = 120.0  # mm/s, >= 20
//! accel_chip = "adxl345"
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::Instrument;

use super::{ProcedureProgress, ProcedureState};
use crate::error::{SweepError, SweepResult};
use crate::hardware::capabilities::{AnalysisPipeline, Point, SensorResolver, Toolhead};
use crate::hardware::Machine;
use crate::measurement::MeasurementSet;
use crate::procedures::geometry::MotionSegment;
use crate::procedures::handoff::hand_off;
use crate::procedures::kinematics::KinematicsProfile;
use crate::procedures::result::{ExecutionTiming, SweepReport};
use crate::procedures::speed_plan::{validate_travel, SpeedPlan};
use crate::procedures::synchronizer::{resolve_sensor, RecordingSynchronizer};
use crate::procedures::velocity_limits::VelocityLimitScope;

/// Offset of the waiting position from the bed center, on X and Y (mm)
pub const APPROACH_OFFSET: f64 = 15.0;

/// Pause after reaching the waiting position
pub const APPROACH_DWELL: Duration = Duration::from_millis(500);

/// The Z approach runs at this fraction of the travel speed
const Z_APPROACH_DIVISOR: f64 = 10.0;

const MIN_SIZE: f64 = 50.0;
const MIN_MAX_SPEED: f64 = 10.0;
const MIN_SPEED_INCREMENT: f64 = 1.0;
const MIN_ACCEL: u32 = 100;
const MIN_TRAVEL_SPEED: f64 = 20.0;

// =============================================================================
// Configuration
// =============================================================================

/// Typed configuration for a vibrations sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Pattern size (mm)
    #[serde(default = "default_size")]
    pub size: f64,

    /// Height the pattern is run at (mm)
    #[serde(default = "default_z_height")]
    pub z_height: f64,

    /// Highest tested speed (mm/s)
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,

    /// Step between tested speeds (mm/s)
    #[serde(default = "default_speed_increment")]
    pub speed_increment: f64,

    /// Acceleration used for the test (mm/s²)
    #[serde(default = "default_accel")]
    pub accel: u32,

    /// Speed of the untimed positioning moves (mm/s)
    #[serde(default = "default_travel_speed")]
    pub travel_speed: f64,

    /// Accelerometer to use for every angle; resolved per angle when unset
    #[serde(default)]
    pub accel_chip: Option<String>,
}

fn default_size() -> f64 {
    100.0
}
fn default_z_height() -> f64 {
    20.0
}
fn default_max_speed() -> f64 {
    200.0
}
fn default_speed_increment() -> f64 {
    2.0
}
fn default_accel() -> u32 {
    3000
}
fn default_travel_speed() -> f64 {
    120.0
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            z_height: default_z_height(),
            max_speed: default_max_speed(),
            speed_increment: default_speed_increment(),
            accel: default_accel(),
            travel_speed: default_travel_speed(),
            accel_chip: None,
        }
    }
}

impl SweepConfig {
    /// Explicitly requested accelerometer. An empty name counts as none.
    pub fn accel_chip(&self) -> Option<&str> {
        self.accel_chip
            .as_deref()
            .map(str::trim)
            .filter(|chip| !chip.is_empty())
    }

    /// Check every parameter against its minimum and the pattern against the top speed.
    pub fn validate(&self) -> SweepResult<()> {
        if self.speed_increment.is_nan() || self.speed_increment <= 0.0 {
            return Err(SweepError::InvalidIncrement(self.speed_increment));
        }
        at_least("SIZE", self.size, MIN_SIZE)?;
        at_least("MAX_SPEED", self.max_speed, MIN_MAX_SPEED)?;
        at_least("SPEED_INCREMENT", self.speed_increment, MIN_SPEED_INCREMENT)?;
        at_least("ACCEL", f64::from(self.accel), f64::from(MIN_ACCEL))?;
        at_least("TRAVEL_SPEED", self.travel_speed, MIN_TRAVEL_SPEED)?;
        if !self.size.is_finite() {
            return Err(SweepError::Configuration(format!(
                "SIZE must be a finite number (got {})",
                self.size
            )));
        }
        if !self.z_height.is_finite() {
            return Err(SweepError::Configuration(format!(
                "Z_HEIGHT must be a finite number (got {})",
                self.z_height
            )));
        }
        validate_travel(self.size, self.max_speed)
    }

    /// Speeds tested on every angle
    pub fn speed_plan(&self) -> SweepResult<SpeedPlan> {
        SpeedPlan::new(self.max_speed, self.speed_increment)
    }
}

fn at_least(name: &'static str, value: f64, minimum: f64) -> SweepResult<()> {
    if value.is_nan() || value < minimum {
        return Err(SweepError::ParameterOutOfRange {
            name,
            value,
            minimum,
        });
    }
    Ok(())
}

/// Validate `config` and resolve what a sweep on `kinematics` would measure.
///
/// Touches no hardware, so it can be used for dry runs.
pub fn plan_sweep(
    config: &SweepConfig,
    kinematics: &str,
) -> SweepResult<(KinematicsProfile, SpeedPlan)> {
    config.validate()?;
    let profile = KinematicsProfile::from_tag(kinematics)?;
    let plan = config.speed_plan()?;
    Ok((profile, plan))
}

// =============================================================================
// Procedure
// =============================================================================

/// Vibrations profile sweep.
///
/// One instance runs one sweep at a time; progress is published on a watch channel.
pub struct VibrationsProfile {
    config: SweepConfig,
    state: ProcedureState,
    progress_tx: watch::Sender<ProcedureProgress>,
}

impl VibrationsProfile {
    /// Create the procedure. The receiver observes progress updates.
    pub fn new(config: SweepConfig) -> (Self, watch::Receiver<ProcedureProgress>) {
        let (progress_tx, progress_rx) = watch::channel(ProcedureProgress::default());
        let procedure = Self {
            config,
            state: ProcedureState::Idle,
            progress_tx,
        };
        (procedure, progress_rx)
    }

    /// Sweep parameters
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcedureState {
        self.state
    }

    /// Latest published progress
    pub fn progress(&self) -> ProcedureProgress {
        self.progress_tx.borrow().clone()
    }

    /// Check the parameters and the machine's prerequisites, and resolve the test angles.
    ///
    /// Nothing on the machine is changed.
    pub async fn validate(
        &mut self,
        toolhead: &dyn Toolhead,
    ) -> SweepResult<(KinematicsProfile, SpeedPlan)> {
        self.update_progress(
            ProcedureState::Validating,
            0,
            0,
            "validate",
            "Validating sweep parameters",
        );

        self.config.validate()?;

        let has_shaper = toolhead
            .has_input_shaper()
            .await
            .map_err(SweepError::Hardware)?;
        if !has_shaper {
            return Err(SweepError::MissingPrerequisite(
                "Input shaper is not configured! Please run the shaper calibration first."
                    .to_string(),
            ));
        }

        let kinematics = toolhead.kinematics().await.map_err(SweepError::Hardware)?;
        plan_sweep(&self.config, &kinematics)
    }

    /// Run the whole sweep on `machine` and hand the recordings to `pipeline`.
    pub async fn run(
        &mut self,
        machine: &Machine,
        pipeline: &dyn AnalysisPipeline,
    ) -> SweepResult<SweepReport> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("vibrations_profile", execution_id = %execution_id);

        let result = self
            .execute(machine, pipeline, execution_id)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => {
                tracing::info!("{}", report.summary());
                let total = self.progress_tx.borrow().total_steps;
                self.update_progress(
                    ProcedureState::Completed,
                    total,
                    total,
                    "done",
                    "Sweep completed",
                );
            }
            Err(e) => {
                tracing::error!("Vibrations sweep failed: {}", e);
                let (step, total) = {
                    let progress = self.progress_tx.borrow();
                    (progress.current_step, progress.total_steps)
                };
                self.update_progress(ProcedureState::Failed, step, total, "failed", &e.to_string());
            }
        }
        result
    }

    async fn execute(
        &mut self,
        machine: &Machine,
        pipeline: &dyn AnalysisPipeline,
        execution_id: String,
    ) -> SweepResult<SweepReport> {
        let started = Instant::now();
        let started_at = chrono::Utc::now();
        let toolhead = machine.toolhead.as_ref();

        let (profile, plan) = self.validate(toolhead).await?;
        tracing::info!(
            angles = ?profile.angles,
            "{} kinematics mode",
            profile.family.tag().to_uppercase()
        );

        let _claim = machine.try_lock_sweep()?;

        self.update_progress(ProcedureState::Preparing, 0, 0, "prepare", "Preparing machine");
        let status = toolhead.status().await.map_err(SweepError::Hardware)?;
        let motors = toolhead.motor_profile().await.map_err(SweepError::Hardware)?;
        let center = status.bounds.center_xy().with_z(self.config.z_height);

        let scope = VelocityLimitScope::enter(toolhead, self.config.accel).await?;
        let restored_limits = *scope.snapshot().previous();
        let measurements = scope
            .run(self.sweep(toolhead, machine.sensors.as_ref(), &profile, &plan, center))
            .await?;

        toolhead.wait_until_idle().await.map_err(SweepError::Hardware)?;

        let total = profile.angles.len() * plan.len();
        self.update_progress(
            ProcedureState::Finalizing,
            total,
            total,
            "handoff",
            "Machine vibrations profile generation...",
        );
        let recordings = measurements.len();
        let total_samples = measurements.total_samples();
        hand_off(
            pipeline,
            &profile.family,
            self.config.accel,
            &motors,
            measurements,
        )
        .await?;

        Ok(SweepReport {
            execution_id,
            kinematics: profile.family,
            angles: profile.angles,
            speeds_per_angle: plan.len(),
            recordings,
            total_samples,
            accel: self.config.accel,
            restored_limits,
            timing: ExecutionTiming::finished(started_at, started.elapsed()),
        })
    }

    /// Everything that runs with the test velocity limits applied.
    async fn sweep(
        &mut self,
        toolhead: &dyn Toolhead,
        sensors: &dyn SensorResolver,
        profile: &KinematicsProfile,
        plan: &SpeedPlan,
        center: Point,
    ) -> SweepResult<MeasurementSet> {
        self.approach(toolhead, center).await?;

        let total = profile.angles.len() * plan.len();
        let mut measurements = MeasurementSet::new();
        let mut synchronizer = RecordingSynchronizer::new();

        for (angle_index, &angle) in profile.angles.iter().enumerate() {
            tracing::info!(angle, "Measuring angle: {} degrees", angle);

            let sensor = resolve_sensor(sensors, self.config.accel_chip(), angle).await?;
            tracing::info!("Accelerometer chip used for this angle: [{}]", sensor.id());

            for sample in plan.samples() {
                let step = angle_index * plan.len() + sample.index;
                self.update_progress(
                    ProcedureState::Running,
                    step,
                    total,
                    &format!("angle_{}", angle),
                    &format!("Current speed: {} mm/s", sample.speed),
                );
                tracing::info!(
                    speed = sample.speed,
                    factor = sample.segment_factor,
                    repetitions = sample.repetitions,
                    "Current speed: {} mm/s",
                    sample.speed
                );

                let segment = MotionSegment::around(
                    center,
                    self.config.size,
                    angle,
                    sample.segment_factor,
                    sample.speed,
                );
                let recording = synchronizer
                    .measure_sample(
                        toolhead,
                        sensor.as_ref(),
                        &segment,
                        &sample,
                        angle,
                        self.config.travel_speed,
                    )
                    .await?;
                measurements.insert(recording);
            }
        }

        tracing::debug!(
            recordings = measurements.len(),
            starts = synchronizer.starts(),
            stops = synchronizer.stops(),
            "Sweep motion done"
        );
        Ok(measurements)
    }

    /// Raise to the test height, then park near the center of the bed.
    async fn approach(&self, toolhead: &dyn Toolhead, center: Point) -> SweepResult<()> {
        let z = self.config.z_height;
        let travel = self.config.travel_speed;

        let current = toolhead.position().await.map_err(SweepError::Hardware)?;
        toolhead
            .move_to(current.with_z(z), travel / Z_APPROACH_DIVISOR)
            .await
            .map_err(SweepError::Hardware)?;
        toolhead
            .move_to(
                Point::new(center.x - APPROACH_OFFSET, center.y - APPROACH_OFFSET, z),
                travel,
            )
            .await
            .map_err(SweepError::Hardware)?;
        toolhead
            .dwell(APPROACH_DWELL)
            .await
            .map_err(SweepError::Hardware)
    }

    /// Update state and publish progress
    fn update_progress(
        &mut self,
        state: ProcedureState,
        step: usize,
        total: usize,
        step_name: &str,
        message: &str,
    ) {
        self.state = state;
        let overall_progress = if total == 0 {
            0.0
        } else {
            step as f64 / total as f64
        };
        self.progress_tx.send_replace(ProcedureProgress {
            state,
            current_step: step,
            total_steps: total,
            step_name: step_name.to_string(),
            overall_progress,
            message: message.to_string(),
        });
    }
}
