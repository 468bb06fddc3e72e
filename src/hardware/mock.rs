//! Mock Hardware Implementations
//!
//! Provides a simulated machine for testing without a physical printer.
//! All mock devices use async-safe state (`tokio::sync::RwLock`), and none of them sleep:
//! motion time is simulated and accumulated instead.
//!
//! # Available Mocks
//!
//! - `MockToolhead` - Queued motion, status, velocity limits, kinematics introspection
//! - `MockAccelerometer` - Produces synthetic samples for every move seen while recording
//! - `MockAnalysisPipeline` - Captures what the sweep hands off
//!
//! Every mock appends to a shared [`EventLog`], so tests can assert the global order of
//! motion and recording events.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::hardware::capabilities::{
    AccelSensor, AnalysisPipeline, AxisBounds, AxisHint, KinematicsInfo, MachineStatus,
    MotionActuator, MotorProfile, Point, VelocityLimitControl, VelocityLimits,
};
use crate::hardware::{Machine, SensorRegistry};
use crate::measurement::{AccelSample, MeasurementSet};
use crate::procedures::kinematics::KinematicsFamily;

/// Synthetic samples produced per captured move
const SAMPLES_PER_MOVE: usize = 64;

// =============================================================================
// EventLog - shared ordering record
// =============================================================================

/// Something observable that happened on the simulated machine.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// A move was queued
    Move {
        /// Target position
        target: Point,
        /// Feedrate (mm/s)
        feedrate: f64,
    },
    /// A dwell was queued
    Dwell(Duration),
    /// The move queue was drained
    Idle,
    /// Velocity limits were written
    LimitsSet(VelocityLimits),
    /// A recording was armed
    RecordingStarted {
        /// Device id
        sensor: String,
        /// Requested name
        name: String,
        /// Timestamp qualification requested
        append_time: bool,
    },
    /// A recording was closed
    RecordingStopped {
        /// Device id
        sensor: String,
        /// Number of samples returned
        samples: usize,
    },
    /// The analysis pipeline was configured
    PipelineConfigured,
    /// Measurements were submitted
    PipelineSubmitted(usize),
    /// The pipeline reported completion
    PipelineCompleted,
}

/// Append-only, shareable event record.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MachineEvent>>>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&self, event: MachineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// Copy of all events so far
    pub fn snapshot(&self) -> Vec<MachineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of events so far
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether nothing was logged yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves logged since event index `from`
    pub fn moves_since(&self, from: usize) -> usize {
        self.snapshot()
            .iter()
            .skip(from)
            .filter(|e| matches!(e, MachineEvent::Move { .. }))
            .count()
    }
}

// =============================================================================
// MockToolhead - Simulated motion system
// =============================================================================

/// Configuration of a [`MockToolhead`].
#[derive(Debug, Clone)]
pub struct MockToolheadConfig {
    /// Kinematics tag reported by the machine
    pub kinematics: String,
    /// Axis travel limits
    pub bounds: AxisBounds,
    /// Initial velocity limits; `cruise_ratio: None` simulates an older firmware
    pub limits: VelocityLimits,
    /// Whether an input shaper is configured
    pub input_shaper: bool,
    /// Motors reported to the pipeline
    pub motors: Vec<String>,
    /// Starting position
    pub initial_position: Point,
    /// Fail the n-th queued move (1-based)
    pub fail_on_move: Option<usize>,
    /// Fail the n-th velocity-limit write (1-based)
    pub fail_on_limit_write: Option<usize>,
}

impl Default for MockToolheadConfig {
    fn default() -> Self {
        Self {
            kinematics: "cartesian".to_string(),
            bounds: AxisBounds {
                min: Point::new(0.0, 0.0, 0.0),
                max: Point::new(300.0, 300.0, 250.0),
            },
            limits: VelocityLimits {
                max_accel: 7000.0,
                corner_velocity: 5.0,
                cruise_ratio: Some(0.5),
            },
            input_shaper: true,
            motors: vec!["stepper_x".to_string(), "stepper_y".to_string()],
            initial_position: Point::new(0.0, 0.0, 10.0),
            fail_on_move: None,
            fail_on_limit_write: None,
        }
    }
}

#[derive(Debug)]
struct ToolheadState {
    position: Point,
    limits: VelocityLimits,
    limit_writes: Vec<VelocityLimits>,
    limit_write_attempts: usize,
    moves_issued: usize,
    pending_time: f64,
    elapsed_time: f64,
}

/// Mock toolhead with a simulated move queue.
///
/// Queued moves add `distance / feedrate` of pending motion time; `wait_until_idle` folds
/// it into the elapsed time. Nothing actually sleeps.
pub struct MockToolhead {
    config: MockToolheadConfig,
    state: RwLock<ToolheadState>,
    log: EventLog,
}

impl MockToolhead {
    /// Create a toolhead with its own event log
    pub fn new(config: MockToolheadConfig) -> Self {
        Self::with_log(config, EventLog::new())
    }

    /// Create a toolhead that records into a shared log
    pub fn with_log(config: MockToolheadConfig, log: EventLog) -> Self {
        let state = ToolheadState {
            position: config.initial_position,
            limits: config.limits,
            limit_writes: Vec::new(),
            limit_write_attempts: 0,
            moves_issued: 0,
            pending_time: 0.0,
            elapsed_time: 0.0,
        };
        Self {
            config,
            state: RwLock::new(state),
            log,
        }
    }

    /// Shared event log
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Velocity limits currently in force
    pub async fn current_limits(&self) -> VelocityLimits {
        self.state.read().await.limits
    }

    /// Every velocity-limit write, in order
    pub async fn limit_writes(&self) -> Vec<VelocityLimits> {
        self.state.read().await.limit_writes.clone()
    }

    /// Number of velocity-limit writes attempted, failed ones included
    pub async fn limit_write_attempts(&self) -> usize {
        self.state.read().await.limit_write_attempts
    }

    /// Number of moves queued so far
    pub async fn moves_issued(&self) -> usize {
        self.state.read().await.moves_issued
    }

    /// Simulated motion time executed so far (seconds)
    pub async fn elapsed_time(&self) -> f64 {
        self.state.read().await.elapsed_time
    }

    fn supports_cruise_ratio(&self) -> bool {
        self.config.limits.cruise_ratio.is_some()
    }
}

impl Default for MockToolhead {
    fn default() -> Self {
        Self::new(MockToolheadConfig::default())
    }
}

#[async_trait]
impl MotionActuator for MockToolhead {
    async fn move_to(&self, target: Point, feedrate: f64) -> Result<()> {
        if feedrate <= 0.0 {
            bail!("Invalid feedrate {}", feedrate);
        }

        let mut state = self.state.write().await;
        state.moves_issued += 1;
        if self.config.fail_on_move == Some(state.moves_issued) {
            bail!("Simulated move failure on move #{}", state.moves_issued);
        }

        let (min, max) = (self.config.bounds.min, self.config.bounds.max);
        if target.x < min.x || target.x > max.x || target.y < min.y || target.y > max.y {
            bail!(
                "Move out of range: ({:.3}, {:.3}) outside [{:.1}..{:.1}, {:.1}..{:.1}]",
                target.x,
                target.y,
                min.x,
                max.x,
                min.y,
                max.y
            );
        }

        let from = state.position;
        let distance =
            ((target.x - from.x).powi(2) + (target.y - from.y).powi(2) + (target.z - from.z).powi(2))
                .sqrt();
        state.pending_time += distance / feedrate;
        state.position = target;
        drop(state);

        tracing::trace!(?target, feedrate, "MockToolhead: move queued");
        self.log.push(MachineEvent::Move { target, feedrate });
        Ok(())
    }

    async fn wait_until_idle(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.elapsed_time += state.pending_time;
        state.pending_time = 0.0;
        drop(state);

        tokio::task::yield_now().await;
        self.log.push(MachineEvent::Idle);
        Ok(())
    }

    async fn dwell(&self, duration: Duration) -> Result<()> {
        self.state.write().await.pending_time += duration.as_secs_f64();
        self.log.push(MachineEvent::Dwell(duration));
        Ok(())
    }

    async fn position(&self) -> Result<Point> {
        Ok(self.state.read().await.position)
    }

    async fn status(&self) -> Result<MachineStatus> {
        Ok(MachineStatus {
            bounds: self.config.bounds,
            limits: self.state.read().await.limits,
        })
    }
}

#[async_trait]
impl VelocityLimitControl for MockToolhead {
    async fn set_velocity_limits(&self, limits: &VelocityLimits) -> Result<()> {
        if limits.cruise_ratio.is_some() && !self.supports_cruise_ratio() {
            bail!("Unknown velocity limit parameter MINIMUM_CRUISE_RATIO");
        }

        let mut state = self.state.write().await;
        state.limit_write_attempts += 1;
        let write_index = state.limit_write_attempts;
        if self.config.fail_on_limit_write == Some(write_index) {
            bail!("Simulated velocity limit failure on write #{}", write_index);
        }

        state.limits.max_accel = limits.max_accel;
        state.limits.corner_velocity = limits.corner_velocity;
        if let Some(ratio) = limits.cruise_ratio {
            state.limits.cruise_ratio = Some(ratio);
        }
        state.limit_writes.push(*limits);
        drop(state);

        self.log.push(MachineEvent::LimitsSet(*limits));
        Ok(())
    }
}

#[async_trait]
impl KinematicsInfo for MockToolhead {
    async fn kinematics(&self) -> Result<String> {
        Ok(self.config.kinematics.clone())
    }

    async fn motor_profile(&self) -> Result<MotorProfile> {
        Ok(MotorProfile {
            motors: self.config.motors.clone(),
        })
    }

    async fn has_input_shaper(&self) -> Result<bool> {
        Ok(self.config.input_shaper)
    }
}

// =============================================================================
// MockAccelerometer - Simulated inertial sensor
// =============================================================================

#[derive(Debug)]
struct CaptureState {
    name: String,
    log_start: usize,
}

/// Mock accelerometer.
///
/// While recording it "captures" [`SAMPLES_PER_MOVE`] synthetic samples for every move
/// logged on the shared [`EventLog`] between start and stop.
pub struct MockAccelerometer {
    id: String,
    log: EventLog,
    sample_rate_hz: f64,
    capture: RwLock<Option<CaptureState>>,
    fail_start: bool,
}

impl MockAccelerometer {
    /// Create an accelerometer sharing `log` with the toolhead
    pub fn new(id: impl Into<String>, log: EventLog) -> Self {
        Self {
            id: id.into(),
            log,
            sample_rate_hz: 3200.0,
            capture: RwLock::new(None),
            fail_start: false,
        }
    }

    /// Accelerometer whose `start_recording` always fails
    pub fn failing(id: impl Into<String>, log: EventLog) -> Self {
        Self {
            fail_start: true,
            ..Self::new(id, log)
        }
    }

    /// Whether a capture is in progress
    pub async fn is_recording(&self) -> bool {
        self.capture.read().await.is_some()
    }

    fn synthesize(&self, count: usize) -> Vec<AccelSample> {
        let dt = 1.0 / self.sample_rate_hz;
        (0..count)
            .map(|i| {
                let t = i as f64 * dt;
                let phase = 2.0 * std::f64::consts::PI * 120.0 * t;
                AccelSample {
                    time: t,
                    x: 800.0 * phase.sin(),
                    y: 400.0 * (phase * 1.5).sin(),
                    z: 9810.0 + 50.0 * phase.cos(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl AccelSensor for MockAccelerometer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start_recording(&self, name: &str, append_time: bool) -> Result<()> {
        if self.fail_start {
            bail!("[{}] did not acknowledge the start request", self.id);
        }

        let mut capture = self.capture.write().await;
        if let Some(open) = capture.as_ref() {
            bail!("[{}] is already recording '{}'", self.id, open.name);
        }
        *capture = Some(CaptureState {
            name: name.to_string(),
            log_start: self.log.len(),
        });
        drop(capture);

        self.log.push(MachineEvent::RecordingStarted {
            sensor: self.id.clone(),
            name: name.to_string(),
            append_time,
        });
        Ok(())
    }

    async fn stop_recording(&self) -> Result<Vec<AccelSample>> {
        let state = self
            .capture
            .write()
            .await
            .take()
            .ok_or_else(|| anyhow!("[{}] is not recording", self.id))?;

        let moves = self.log.moves_since(state.log_start);
        let samples = self.synthesize(moves * SAMPLES_PER_MOVE);

        self.log.push(MachineEvent::RecordingStopped {
            sensor: self.id.clone(),
            samples: samples.len(),
        });
        Ok(samples)
    }
}

// =============================================================================
// MockAnalysisPipeline
// =============================================================================

/// What the sweep handed to the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineCapture {
    /// Kinematics passed to `configure`
    pub kinematics: Option<KinematicsFamily>,
    /// Acceleration passed to `configure`
    pub accel: Option<u32>,
    /// Motors passed to `configure`
    pub motors: Option<MotorProfile>,
    /// Submitted measurements
    pub measurements: Option<MeasurementSet>,
    /// Whether `await_completion` was reached
    pub completed: bool,
}

/// Mock pipeline that keeps everything it receives.
pub struct MockAnalysisPipeline {
    log: EventLog,
    capture: RwLock<PipelineCapture>,
}

impl MockAnalysisPipeline {
    /// Create a pipeline recording into `log`
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            capture: RwLock::new(PipelineCapture {
                kinematics: None,
                accel: None,
                motors: None,
                measurements: None,
                completed: false,
            }),
        }
    }

    /// Everything received so far
    pub async fn captured(&self) -> PipelineCapture {
        self.capture.read().await.clone()
    }
}

#[async_trait]
impl AnalysisPipeline for MockAnalysisPipeline {
    async fn configure(
        &self,
        kinematics: &KinematicsFamily,
        accel: u32,
        motors: &MotorProfile,
    ) -> Result<()> {
        let mut capture = self.capture.write().await;
        capture.kinematics = Some(kinematics.clone());
        capture.accel = Some(accel);
        capture.motors = Some(motors.clone());
        drop(capture);
        self.log.push(MachineEvent::PipelineConfigured);
        Ok(())
    }

    async fn submit(&self, measurements: MeasurementSet) -> Result<()> {
        let mut capture = self.capture.write().await;
        if capture.kinematics.is_none() {
            bail!("Pipeline was not configured before submit");
        }
        self.log
            .push(MachineEvent::PipelineSubmitted(measurements.len()));
        capture.measurements = Some(measurements);
        Ok(())
    }

    async fn await_completion(&self) -> Result<()> {
        let mut capture = self.capture.write().await;
        if capture.measurements.is_none() {
            bail!("Nothing was submitted");
        }
        capture.completed = true;
        drop(capture);
        self.log.push(MachineEvent::PipelineCompleted);
        Ok(())
    }
}

// =============================================================================
// Simulated machine assembly
// =============================================================================

/// One simulated accelerometer and the axes it is mounted for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSensor {
    /// Device id
    pub id: String,
    /// Axis assignments ("x", "y", "xy")
    pub axes: Vec<AxisHint>,
}

/// Description of the simulated machine used by the CLI and integration tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedMachineConfig {
    /// Kinematics tag ("cartesian", "corexy", "corexz", ...)
    pub kinematics: String,
    /// Axis travel limits
    pub bounds: AxisBounds,
    /// Configured maximum acceleration (mm/s²)
    pub max_accel: f64,
    /// Configured square corner velocity (mm/s)
    pub corner_velocity: f64,
    /// Configured minimum cruise ratio; omit for firmware without the setting
    #[serde(default)]
    pub cruise_ratio: Option<f64>,
    /// Whether an input shaper is configured
    pub input_shaper: bool,
    /// Motors reported to the analysis pipeline
    pub motors: Vec<String>,
    /// Attached accelerometers
    pub sensors: Vec<SimulatedSensor>,
}

impl Default for SimulatedMachineConfig {
    fn default() -> Self {
        let toolhead = MockToolheadConfig::default();
        Self {
            kinematics: toolhead.kinematics,
            bounds: toolhead.bounds,
            max_accel: toolhead.limits.max_accel,
            corner_velocity: toolhead.limits.corner_velocity,
            cruise_ratio: None,
            input_shaper: toolhead.input_shaper,
            motors: toolhead.motors,
            sensors: vec![SimulatedSensor {
                id: "adxl345".to_string(),
                axes: vec![AxisHint::A, AxisHint::B, AxisHint::Combined],
            }],
        }
    }
}

impl SimulatedMachineConfig {
    /// Toolhead part of the configuration
    pub fn toolhead_config(&self) -> MockToolheadConfig {
        MockToolheadConfig {
            kinematics: self.kinematics.clone(),
            bounds: self.bounds,
            limits: VelocityLimits {
                max_accel: self.max_accel,
                corner_velocity: self.corner_velocity,
                cruise_ratio: self.cruise_ratio,
            },
            input_shaper: self.input_shaper,
            motors: self.motors.clone(),
            initial_position: self.bounds.min.with_z(self.bounds.max.z / 2.0),
            ..Default::default()
        }
    }
}

/// Assemble a [`Machine`] from simulated devices that all record into `log`.
pub fn simulated_machine(config: &SimulatedMachineConfig, log: EventLog) -> Result<Machine> {
    let toolhead = Arc::new(MockToolhead::with_log(config.toolhead_config(), log.clone()));

    let mut registry = SensorRegistry::new();
    for sensor in &config.sensors {
        let device = Arc::new(MockAccelerometer::new(sensor.id.clone(), log.clone()));
        registry.register(device, &sensor.axes)?;
    }

    tracing::info!(
        kinematics = %config.kinematics,
        sensors = registry.len(),
        "Simulated machine ready"
    );
    Ok(Machine::new(toolhead, Arc::new(registry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_machine_assembly() {
        let log = EventLog::new();
        let machine = simulated_machine(&SimulatedMachineConfig::default(), log).unwrap();

        assert_eq!(machine.toolhead.kinematics().await.unwrap(), "cartesian");
        assert_eq!(
            machine
                .sensors
                .find_device_for_axis(AxisHint::B)
                .await
                .as_deref(),
            Some("adxl345")
        );
    }

    #[test]
    fn test_duplicate_simulated_sensors_rejected() {
        let sensor = SimulatedSensor {
            id: "adxl345".into(),
            axes: vec![AxisHint::A],
        };
        let config = SimulatedMachineConfig {
            sensors: vec![sensor.clone(), sensor],
            ..Default::default()
        };
        assert!(simulated_machine(&config, EventLog::new()).is_err());
    }

    #[tokio::test]
    async fn test_mock_toolhead_moves() {
        let toolhead = MockToolhead::default();

        toolhead
            .move_to(Point::new(10.0, 0.0, 10.0), 10.0)
            .await
            .unwrap();
        assert_eq!(
            toolhead.position().await.unwrap(),
            Point::new(10.0, 0.0, 10.0)
        );
        assert_eq!(toolhead.elapsed_time().await, 0.0);

        toolhead.wait_until_idle().await.unwrap();
        assert!((toolhead.elapsed_time().await - 1.0).abs() < 1e-9);
        assert_eq!(toolhead.moves_issued().await, 1);
    }

    #[tokio::test]
    async fn test_mock_toolhead_rejects_out_of_range() {
        let toolhead = MockToolhead::default();
        let result = toolhead.move_to(Point::new(-5.0, 10.0, 10.0), 50.0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_toolhead_fault_injection() {
        let toolhead = MockToolhead::new(MockToolheadConfig {
            fail_on_move: Some(2),
            ..Default::default()
        });
        let target = Point::new(5.0, 5.0, 10.0);
        assert!(toolhead.move_to(target, 20.0).await.is_ok());
        assert!(toolhead.move_to(target, 20.0).await.is_err());
    }

    #[tokio::test]
    async fn test_legacy_firmware_rejects_cruise_ratio() {
        let toolhead = MockToolhead::new(MockToolheadConfig {
            limits: VelocityLimits {
                max_accel: 5000.0,
                corner_velocity: 5.0,
                cruise_ratio: None,
            },
            ..Default::default()
        });

        let with_ratio = VelocityLimits {
            max_accel: 3000.0,
            corner_velocity: 5.0,
            cruise_ratio: Some(0.0),
        };
        assert!(toolhead.set_velocity_limits(&with_ratio).await.is_err());

        let without = VelocityLimits {
            cruise_ratio: None,
            ..with_ratio
        };
        toolhead.set_velocity_limits(&without).await.unwrap();
        assert_eq!(toolhead.current_limits().await.max_accel, 3000.0);
        assert_eq!(toolhead.current_limits().await.cruise_ratio, None);
    }

    #[tokio::test]
    async fn test_mock_accelerometer_captures_moves() {
        let log = EventLog::new();
        let toolhead = MockToolhead::with_log(MockToolheadConfig::default(), log.clone());
        let accel = MockAccelerometer::new("adxl345", log.clone());

        accel.start_recording("rec", true).await.unwrap();
        assert!(accel.is_recording().await);
        assert!(accel.start_recording("again", true).await.is_err());

        toolhead
            .move_to(Point::new(20.0, 20.0, 10.0), 100.0)
            .await
            .unwrap();
        toolhead
            .move_to(Point::new(10.0, 10.0, 10.0), 100.0)
            .await
            .unwrap();

        let samples = accel.stop_recording().await.unwrap();
        assert_eq!(samples.len(), 2 * SAMPLES_PER_MOVE);
        assert!(!accel.is_recording().await);
        assert!(accel.stop_recording().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_pipeline_requires_configure() {
        let pipeline = MockAnalysisPipeline::new(EventLog::new());
        assert!(pipeline.submit(MeasurementSet::new()).await.is_err());

        pipeline
            .configure(&KinematicsFamily::CoreXy, 3000, &MotorProfile::default())
            .await
            .unwrap();
        pipeline.submit(MeasurementSet::new()).await.unwrap();
        pipeline.await_completion().await.unwrap();
        assert!(pipeline.captured().await.completed);
    }
}
