//! Hardware abstraction layer.
//!
//! - `capabilities`: the narrow async traits the sweep consumes
//! - `registry`: accelerometer lookup by id and axis
//! - `mock`: a simulated machine for tests and dry runs
//!
//! [`Machine`] bundles one toolhead with its accelerometers and owns the lock that keeps
//! two sweeps from fighting over the same velocity limits.

pub mod capabilities;
pub mod mock;
pub mod registry;

pub use capabilities::{
    AccelSensor, AnalysisPipeline, AxisBounds, AxisHint, KinematicsInfo, MachineStatus,
    MotionActuator, MotorProfile, Point, SensorResolver, Toolhead, VelocityLimitControl,
    VelocityLimits,
};
pub use registry::SensorRegistry;

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{SweepError, SweepResult};

/// A toolhead together with its sensors.
///
/// Cloning shares the underlying devices and the sweep lock.
#[derive(Clone)]
pub struct Machine {
    /// Motion system
    pub toolhead: Arc<dyn Toolhead>,
    /// Accelerometer lookup
    pub sensors: Arc<dyn SensorResolver>,
    sweep_lock: Arc<Mutex<()>>,
}

impl Machine {
    /// Bundle a toolhead with its sensor resolver
    pub fn new(toolhead: Arc<dyn Toolhead>, sensors: Arc<dyn SensorResolver>) -> Self {
        Self {
            toolhead,
            sensors,
            sweep_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Claim the machine for a sweep.
    ///
    /// Never waits: if another sweep holds the machine this fails with
    /// [`SweepError::MachineBusy`]. The claim is released when the guard drops.
    pub fn try_lock_sweep(&self) -> SweepResult<OwnedMutexGuard<()>> {
        Arc::clone(&self.sweep_lock)
            .try_lock_owned()
            .map_err(|_| SweepError::MachineBusy)
    }

    /// Whether a sweep currently holds the machine
    pub fn is_busy(&self) -> bool {
        self.sweep_lock.try_lock().is_err()
    }
}
