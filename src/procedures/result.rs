//! Sweep results.
//!
//! Summary of a completed vibrations sweep, returned to the caller once the measurements
//! were handed off. The measurements themselves belong to the analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::hardware::capabilities::VelocityLimits;
use crate::procedures::kinematics::KinematicsFamily;

/// Execution timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTiming {
    /// When the sweep started
    pub started_at: DateTime<Utc>,
    /// When the measurements were acknowledged by the pipeline
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration of the whole sweep
    #[serde(with = "duration_secs")]
    pub total_duration: Duration,
}

impl ExecutionTiming {
    /// Timing of a sweep that started at `started_at` and just finished
    pub fn finished(started_at: DateTime<Utc>, total_duration: Duration) -> Self {
        Self {
            started_at,
            completed_at: Utc::now(),
            total_duration,
        }
    }
}

/// Outcome of a successful sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    /// Unique execution ID
    pub execution_id: String,
    /// Kinematics the angles were derived from
    pub kinematics: KinematicsFamily,
    /// Tested angles (degrees), in measurement order
    pub angles: Vec<f64>,
    /// Speed samples measured per angle
    pub speeds_per_angle: usize,
    /// Recordings handed to the analysis pipeline
    pub recordings: usize,
    /// Samples across all recordings
    pub total_samples: usize,
    /// Acceleration used for the test (mm/s²)
    pub accel: u32,
    /// Velocity limits written back after the sweep
    pub restored_limits: VelocityLimits,
    /// Execution timing
    pub timing: ExecutionTiming,
}

impl SweepReport {
    /// Generate a human-readable summary
    pub fn summary(&self) -> String {
        let angles = self
            .angles
            .iter()
            .map(|a| format!("{:.0}°", a))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "vibrations_profile - {} - angles [{}] x {} speeds - {} recordings ({} samples) - Duration: {:.1}s",
            self.kinematics,
            angles,
            self.speeds_per_angle,
            self.recordings,
            self.total_samples,
            self.timing.total_duration.as_secs_f64()
        )
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
