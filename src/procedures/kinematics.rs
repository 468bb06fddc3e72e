//! Kinematics-to-angle resolution.
//!
//! The sweep excites each motor on its own, so the test angles follow the motor layout:
//! cartesian and CoreXZ machines drive X and Y directly, CoreXY machines drive the A and B
//! belts which sit at 45° and 135° to the cartesian axes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SweepError, SweepResult};
use crate::hardware::capabilities::AxisHint;

/// Principal angles for machines whose motors are on the X and Y axes.
pub const CARTESIAN_ANGLES: [f64; 2] = [0.0, 90.0];

/// Principal angles for CoreXY machines (A and B belt directions).
pub const COREXY_ANGLES: [f64; 2] = [45.0, 135.0];

/// Kinematic family of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KinematicsFamily {
    /// Independent X and Y motors
    Cartesian,
    /// Belt-coupled X/Y motion
    CoreXy,
    /// Belt-coupled X/Z motion, Y driven directly
    CoreXz,
    /// Anything else (delta, polar, hybrid...)
    Unsupported(String),
}

impl KinematicsFamily {
    /// Parse the family tag found in the machine configuration.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "cartesian" => KinematicsFamily::Cartesian,
            "corexy" | "core-xy" | "core_xy" => KinematicsFamily::CoreXy,
            "corexz" | "core-xz" | "core_xz" => KinematicsFamily::CoreXz,
            _ => KinematicsFamily::Unsupported(tag.to_string()),
        }
    }

    /// Canonical tag, as understood by the analysis pipeline
    pub fn tag(&self) -> &str {
        match self {
            KinematicsFamily::Cartesian => "cartesian",
            KinematicsFamily::CoreXy => "corexy",
            KinematicsFamily::CoreXz => "corexz",
            KinematicsFamily::Unsupported(tag) => tag,
        }
    }

    /// Principal test angles in degrees, in measurement order.
    pub fn principal_angles(&self) -> SweepResult<&'static [f64]> {
        match self {
            KinematicsFamily::Cartesian | KinematicsFamily::CoreXz => Ok(&CARTESIAN_ANGLES),
            KinematicsFamily::CoreXy => Ok(&COREXY_ANGLES),
            KinematicsFamily::Unsupported(tag) => {
                Err(SweepError::UnsupportedKinematics(tag.clone()))
            }
        }
    }
}

impl fmt::Display for KinematicsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Resolved kinematics: the family and the angles the sweep will test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicsProfile {
    /// Machine family
    pub family: KinematicsFamily,
    /// Test angles in degrees
    pub angles: Vec<f64>,
}

impl KinematicsProfile {
    /// Resolve the profile for a family, rejecting unsupported ones.
    pub fn resolve(family: KinematicsFamily) -> SweepResult<Self> {
        let angles = family.principal_angles()?.to_vec();
        Ok(Self { family, angles })
    }

    /// Resolve straight from a configuration tag.
    pub fn from_tag(tag: &str) -> SweepResult<Self> {
        Self::resolve(KinematicsFamily::from_tag(tag))
    }
}

/// Default accelerometer axis for a test angle.
///
/// Only used when no accelerometer was explicitly requested.
pub fn axis_hint_for_angle(angle_deg: f64) -> AxisHint {
    if angle_deg == 0.0 {
        AxisHint::A
    } else if angle_deg == 90.0 {
        AxisHint::B
    } else {
        AxisHint::Combined
    }
}
