//! Sweep Procedure
//!
//! The vibrations profile sweep and the pieces it is built from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        VibrationsProfile                                │
//! │  validate → claim → override limits → sweep → restore → hand off        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  kinematics      speed_plan       geometry       synchronizer           │
//! │  angles          speeds/passes    segments       start/moves/stop       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  velocity_limits (+ panic_safety)              handoff                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                        Capabilities (hardware)                          │
//! │  MotionActuator | VelocityLimitControl | KinematicsInfo | AccelSensor   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use vibration_profile::procedures::{SweepConfig, VibrationsProfile};
//!
//! let (mut procedure, progress) = VibrationsProfile::new(SweepConfig::default());
//! let report = procedure.run(&machine, &pipeline).await?;
//! println!("{}", report.summary());
//! ```

pub mod geometry;
pub mod handoff;
pub mod kinematics;
pub mod panic_safety;
pub mod result;
pub mod speed_plan;
pub mod synchronizer;
pub mod velocity_limits;
pub mod vibrations_profile;

// Re-exports
pub use geometry::MotionSegment;
pub use kinematics::{KinematicsFamily, KinematicsProfile};
pub use panic_safety::PanicGuard;
pub use result::{ExecutionTiming, SweepReport};
pub use speed_plan::{SpeedPlan, SpeedSample};
pub use synchronizer::RecordingSynchronizer;
pub use velocity_limits::{VelocityLimitScope, VelocityLimitSnapshot};
pub use vibrations_profile::{plan_sweep, SweepConfig, VibrationsProfile};

use serde::{Deserialize, Serialize};

/// Current state of a procedure execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureState {
    /// Not yet started
    Idle,
    /// Validating parameters and prerequisites
    Validating,
    /// Reading machine state, claiming the machine
    Preparing,
    /// Measuring
    Running,
    /// Handing measurements off
    Finalizing,
    /// Completed successfully
    Completed,
    /// Failed with error
    Failed,
}

/// Progress information during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureProgress {
    /// Current state
    pub state: ProcedureState,
    /// Current step index (0-based)
    pub current_step: usize,
    /// Total number of steps
    pub total_steps: usize,
    /// Current step name
    pub step_name: String,
    /// Overall progress (0.0 - 1.0)
    pub overall_progress: f64,
    /// Status message
    pub message: String,
}

impl Default for ProcedureProgress {
    fn default() -> Self {
        Self {
            state: ProcedureState::Idle,
            current_step: 0,
            total_steps: 0,
            step_name: String::new(),
            overall_progress: 0.0,
            message: String::new(),
        }
    }
}
