//! Atomic Hardware Capabilities
//!
//! This module defines the fine-grained capability traits the sweep consumes. The sweep
//! never talks to a concrete toolhead or accelerometer driver; it only sees these narrow
//! contracts:
//!
//! - A toolhead implements: `MotionActuator + VelocityLimitControl + KinematicsInfo`
//! - An accelerometer implements: `AccelSensor`
//! - Something that knows which accelerometer sits on which axis implements: `SensorResolver`
//! - The downstream graph generation implements: `AnalysisPipeline`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn back_and_forth<M>(toolhead: &M, a: Point, b: Point, speed: f64) -> Result<()>
//! where
//!     M: MotionActuator
//! {
//!     toolhead.move_to(b, speed).await?;
//!     toolhead.move_to(a, speed).await?;
//!     toolhead.wait_until_idle().await?;
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::measurement::{AccelSample, MeasurementSet};
use crate::procedures::kinematics::KinematicsFamily;

// =============================================================================
// Shared value types
// =============================================================================

/// Cartesian toolhead coordinate in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Point {
    /// Create a new point
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same point with a different Z
    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }
}

/// Axis travel limits reported by the kinematics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    /// Minimum reachable coordinate per axis
    pub min: Point,
    /// Maximum reachable coordinate per axis
    pub max: Point,
}

impl AxisBounds {
    /// XY midpoint of the travel area (Z left at 0).
    pub fn center_xy(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            0.0,
        )
    }
}

/// Velocity-limit settings of the motion planner.
///
/// `cruise_ratio` is `None` on machines whose configuration model predates the
/// minimum-cruise-ratio setting. A `None` is never written to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityLimits {
    /// Maximum acceleration (mm/s²)
    pub max_accel: f64,
    /// Square corner velocity (mm/s)
    pub corner_velocity: f64,
    /// Minimum cruise ratio, if the machine supports it
    pub cruise_ratio: Option<f64>,
}

/// Snapshot of the toolhead status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Axis travel limits
    pub bounds: AxisBounds,
    /// Current velocity limits
    pub limits: VelocityLimits,
}

/// Motor description forwarded untouched to the analysis pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorProfile {
    /// Stepper names taking part in the measured motion
    pub motors: Vec<String>,
}

/// Which accelerometer axis a test angle mostly excites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisHint {
    /// First motion axis ("x")
    #[serde(rename = "x")]
    A,
    /// Second motion axis ("y")
    #[serde(rename = "y")]
    B,
    /// Both axes at once ("xy")
    #[serde(rename = "xy")]
    Combined,
}

impl AxisHint {
    /// Short axis label as used in machine configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisHint::A => "x",
            AxisHint::B => "y",
            AxisHint::Combined => "xy",
        }
    }
}

impl std::fmt::Display for AxisHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Capability traits
// =============================================================================

/// Capability: Motion Control
///
/// A toolhead with an asynchronous move queue.
///
/// # Contract
/// - `move_to` enqueues a move and returns without waiting for it to execute
/// - `dwell` enqueues a pause
/// - `wait_until_idle` blocks until every queued move has physically completed
/// - `position` returns the commanded position (end of the last queued move)
#[async_trait]
pub trait MotionActuator: Send + Sync {
    /// Queue a linear move to `target` at `feedrate` (mm/s)
    async fn move_to(&self, target: Point, feedrate: f64) -> Result<()>;

    /// Block until the move queue is fully drained
    async fn wait_until_idle(&self) -> Result<()>;

    /// Queue a pause of `duration`
    async fn dwell(&self, duration: Duration) -> Result<()>;

    /// Commanded toolhead position
    async fn position(&self) -> Result<Point>;

    /// Bounds and velocity limits
    async fn status(&self) -> Result<MachineStatus>;
}

/// Capability: Velocity Limit Control
///
/// # Contract
/// - Fields are applied verbatim
/// - A `None` cruise ratio leaves the machine's cruise ratio untouched
#[async_trait]
pub trait VelocityLimitControl: Send + Sync {
    /// Apply new velocity limits
    async fn set_velocity_limits(&self, limits: &VelocityLimits) -> Result<()>;
}

/// Capability: Kinematics Introspection
#[async_trait]
pub trait KinematicsInfo: Send + Sync {
    /// Kinematics family tag from the machine configuration (e.g. "corexy")
    async fn kinematics(&self) -> Result<String>;

    /// Motors involved in XY motion
    async fn motor_profile(&self) -> Result<MotorProfile>;

    /// Whether an input shaper subsystem is configured
    async fn has_input_shaper(&self) -> Result<bool>;
}

/// Capability: Accelerometer Recording
///
/// # Contract
/// - `start_recording` returns once the device confirms it is armed
/// - `stop_recording` closes the capture window and returns the captured samples
/// - At most one recording is open per device
#[async_trait]
pub trait AccelSensor: Send + Sync {
    /// Device identifier (e.g. "adxl345" or "lis2dw toolhead")
    fn id(&self) -> &str;

    /// Arm a named capture; `append_time` asks for a timestamp-qualified file name
    async fn start_recording(&self, name: &str, append_time: bool) -> Result<()>;

    /// Close the capture and hand back the samples
    async fn stop_recording(&self) -> Result<Vec<AccelSample>>;
}

/// Capability: Sensor Lookup
#[async_trait]
pub trait SensorResolver: Send + Sync {
    /// Best accelerometer for the given axis, if any is configured
    async fn find_device_for_axis(&self, axis: AxisHint) -> Option<String>;

    /// Accelerometer by identifier, if attached
    async fn get_sensor(&self, device_id: &str) -> Option<Arc<dyn AccelSensor>>;
}

/// Capability: Downstream Analysis
///
/// # Contract
/// - `configure` is called once, before `submit`
/// - `submit` takes ownership of the measurement set
/// - `await_completion` blocks until the pipeline acknowledges it is done
#[async_trait]
pub trait AnalysisPipeline: Send + Sync {
    /// Configure for the measured machine
    async fn configure(
        &self,
        kinematics: &KinematicsFamily,
        accel: u32,
        motors: &MotorProfile,
    ) -> Result<()>;

    /// Hand over the recordings
    async fn submit(&self, measurements: MeasurementSet) -> Result<()>;

    /// Wait until processing is finished
    async fn await_completion(&self) -> Result<()>;
}

/// Combined trait for toolhead trait objects.
///
/// Implement the individual traits and get this automatically via blanket impl.
pub trait Toolhead: MotionActuator + VelocityLimitControl + KinematicsInfo {}

/// Blanket implementation - any type implementing all three traits is a Toolhead
impl<T: MotionActuator + VelocityLimitControl + KinematicsInfo> Toolhead for T {}
