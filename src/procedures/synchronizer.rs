//! Motion / accelerometer synchronization.
//!
//! Every speed sample is measured as:
//!
//! ```text
//!   approach (travel speed, not recorded)
//!   start_recording ── awaited: the device is armed before any test move is queued
//!   N x (start -> end, end -> start) at the test speed
//!   stop_recording
//!   dwell 0.3s, wait_until_idle ── the queue drains before the next sample
//! ```
//!
//! Moves are queued asynchronously by the toolhead, so `stop_recording` may race with the
//! final deceleration. The dwell and drain make sure the next capture cannot start before
//! the previous motion has fully settled.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{SweepError, SweepResult};
use crate::hardware::capabilities::{AccelSensor, MotionActuator, SensorResolver};
use crate::measurement::Recording;
use crate::procedures::geometry::MotionSegment;
use crate::procedures::kinematics::axis_hint_for_angle;
use crate::procedures::speed_plan::SpeedSample;

/// Pause queued after each capture, before draining the move queue
pub const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Name of the recording for an angle/speed pair, e.g. `vib_an45_00sp102_00`.
///
/// Every character that is not ASCII alphanumeric becomes `_`.
pub fn recording_name(angle_deg: f64, speed: f64) -> String {
    format!("vib_an{:.2}sp{:.2}", angle_deg, speed)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Pick the accelerometer for an angle.
///
/// An explicitly requested device wins; otherwise the resolver is asked for the device on
/// the angle's default axis.
pub async fn resolve_sensor(
    resolver: &dyn SensorResolver,
    explicit: Option<&str>,
    angle_deg: f64,
) -> SweepResult<Arc<dyn AccelSensor>> {
    let device_id = match explicit {
        Some(id) => id.to_string(),
        None => {
            let axis = axis_hint_for_angle(angle_deg);
            resolver
                .find_device_for_axis(axis)
                .await
                .ok_or_else(|| SweepError::SensorNotFound(format!("axis {}", axis)))?
        }
    };

    resolver
        .get_sensor(&device_id)
        .await
        .ok_or(SweepError::SensorNotFound(device_id))
}

#[derive(Debug)]
struct OpenRecording {
    name: String,
    append_time: bool,
    started_at: DateTime<Utc>,
    sensor_id: String,
}

/// Pairs recording start/stop calls and drives one speed sample.
///
/// At most one recording is open at a time; breaking that is reported as
/// [`SweepError::SynchronizationViolation`].
#[derive(Debug, Default)]
pub struct RecordingSynchronizer {
    open: Option<OpenRecording>,
    starts: usize,
    stops: usize,
}

impl RecordingSynchronizer {
    /// Create a synchronizer with no open recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recording is currently open
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Number of recordings started so far
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// Number of recordings stopped so far
    pub fn stops(&self) -> usize {
        self.stops
    }

    /// Arm a recording on `sensor`. Returns once the device confirmed.
    pub async fn start(
        &mut self,
        sensor: &dyn AccelSensor,
        name: &str,
        append_time: bool,
    ) -> SweepResult<()> {
        if let Some(open) = &self.open {
            return Err(SweepError::SynchronizationViolation(format!(
                "cannot start '{}' while '{}' is still recording on [{}]",
                name, open.name, open.sensor_id
            )));
        }

        let started_at = Utc::now();
        sensor
            .start_recording(name, append_time)
            .await
            .map_err(SweepError::Hardware)?;

        self.open = Some(OpenRecording {
            name: name.to_string(),
            append_time,
            started_at,
            sensor_id: sensor.id().to_string(),
        });
        self.starts += 1;
        tracing::debug!(name, sensor = sensor.id(), "Recording started");
        Ok(())
    }

    /// Close the open recording and collect its samples.
    pub async fn stop(&mut self, sensor: &dyn AccelSensor) -> SweepResult<Recording> {
        let open = self.open.take().ok_or_else(|| {
            SweepError::SynchronizationViolation(format!(
                "stop requested on [{}] with no open recording",
                sensor.id()
            ))
        })?;
        if open.sensor_id != sensor.id() {
            let msg = format!(
                "'{}' was started on [{}] but stop was requested on [{}]",
                open.name,
                open.sensor_id,
                sensor.id()
            );
            self.open = Some(open);
            return Err(SweepError::SynchronizationViolation(msg));
        }

        self.stops += 1;
        let samples = sensor
            .stop_recording()
            .await
            .map_err(SweepError::Hardware)?;

        tracing::debug!(name = %open.name, samples = samples.len(), "Recording stopped");
        Ok(Recording {
            name: open.name,
            append_time: open.append_time,
            started_at: open.started_at,
            samples,
        })
    }

    /// Measure one speed sample on `segment`.
    pub async fn measure_sample<M>(
        &mut self,
        toolhead: &M,
        sensor: &dyn AccelSensor,
        segment: &MotionSegment,
        sample: &SpeedSample,
        angle_deg: f64,
        travel_speed: f64,
    ) -> SweepResult<Recording>
    where
        M: MotionActuator + ?Sized,
    {
        toolhead
            .move_to(segment.start, travel_speed)
            .await
            .map_err(SweepError::Hardware)?;

        let name = recording_name(angle_deg, sample.speed);
        self.start(sensor, &name, true).await?;

        if let Err(e) = self.back_and_forth(toolhead, segment, sample).await {
            self.abort(sensor).await;
            return Err(e);
        }

        let recording = self.stop(sensor).await?;

        toolhead
            .dwell(SETTLE_DELAY)
            .await
            .map_err(SweepError::Hardware)?;
        toolhead
            .wait_until_idle()
            .await
            .map_err(SweepError::Hardware)?;

        Ok(recording)
    }

    async fn back_and_forth<M>(
        &self,
        toolhead: &M,
        segment: &MotionSegment,
        sample: &SpeedSample,
    ) -> SweepResult<()>
    where
        M: MotionActuator + ?Sized,
    {
        for _ in 0..sample.repetitions {
            toolhead
                .move_to(segment.end, sample.speed)
                .await
                .map_err(SweepError::Hardware)?;
            toolhead
                .move_to(segment.start, sample.speed)
                .await
                .map_err(SweepError::Hardware)?;
        }
        Ok(())
    }

    /// Best-effort close of an open recording after a motion failure.
    async fn abort(&mut self, sensor: &dyn AccelSensor) {
        if self.open.is_some() {
            if let Err(e) = self.stop(sensor).await {
                tracing::warn!("Could not close recording after motion failure: {}", e);
            }
        }
    }
}
