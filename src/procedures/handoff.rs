//! Measurement handoff.
//!
//! Once every recording is collected, the analysis pipeline is configured for the measured
//! machine, receives the measurement set and is awaited until it acknowledges completion.

use crate::error::{SweepError, SweepResult};
use crate::hardware::capabilities::{AnalysisPipeline, MotorProfile};
use crate::measurement::MeasurementSet;
use crate::procedures::kinematics::KinematicsFamily;

/// Hand `measurements` over to `pipeline` and wait for it.
///
/// Calls `configure`, `submit` and `await_completion` in that order. The set is moved into
/// the pipeline, so nothing can be added to it afterwards.
pub async fn hand_off(
    pipeline: &dyn AnalysisPipeline,
    family: &KinematicsFamily,
    accel: u32,
    motors: &MotorProfile,
    measurements: MeasurementSet,
) -> SweepResult<()> {
    let recordings = measurements.len();

    pipeline
        .configure(family, accel, motors)
        .await
        .map_err(SweepError::Pipeline)?;
    pipeline
        .submit(measurements)
        .await
        .map_err(SweepError::Pipeline)?;

    tracing::info!(recordings, "Measurements submitted, waiting for the analysis pipeline");
    pipeline
        .await_completion()
        .await
        .map_err(SweepError::Pipeline)?;

    tracing::info!("Analysis pipeline done");
    Ok(())
}
