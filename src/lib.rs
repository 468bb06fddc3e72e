//! # Vibrations Profile
//!
//! Measures the vibrations a motion system produces across speeds and directions. The
//! sweep drives a toolhead back and forth along the principal angles of its kinematics,
//! at increasing speeds, while an accelerometer records each pass. The recordings are
//! then handed to an analysis pipeline.
//!
//! ## Crate Structure
//!
//! - **`procedures`**: the sweep itself. Angle resolution, speed planning, segment geometry,
//!   motion/recording synchronization, velocity-limit override and restore, handoff.
//! - **`hardware`**: capability traits the sweep consumes (`MotionActuator`,
//!   `VelocityLimitControl`, `KinematicsInfo`, `AccelSensor`, `SensorResolver`,
//!   `AnalysisPipeline`), the accelerometer registry and a simulated machine.
//! - **`measurement`**: recordings and the measurement set handed to the pipeline.
//! - **`data`**: CSV export pipeline.
//! - **`config`**: figment-based configuration (TOML + environment).
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: the `SweepError` type.

pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod procedures;

pub use error::{SweepError, SweepResult};
