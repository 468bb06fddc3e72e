//! Configuration System using Figment
//!
//! Strongly-typed configuration for the `vibration_profile` binary. Configuration is
//! loaded from:
//! 1. `config/vibration_profile.toml` (or the file given on the command line)
//! 2. Environment variables prefixed with `VIBRATION_PROFILE_`, nested keys separated by `__`
//!
//! Every section has defaults, so an empty or missing file yields a working configuration
//! for the simulated machine.
//!
//! # Example
//! ```no_run
//! use vibration_profile::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Sweeping up to {} mm/s", config.sweep.max_speed);
//! # Ok::<(), vibration_profile::error::SweepError>(())
//! ```
//!
//! Environment override example: `VIBRATION_PROFILE_SWEEP__MAX_SPEED=150`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{SweepError, SweepResult};
use crate::hardware::mock::SimulatedMachineConfig;
use crate::procedures::SweepConfig;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/vibration_profile.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VIBRATION_PROFILE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Sweep parameters
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Simulated machine description
    #[serde(default)]
    pub machine: SimulatedMachineConfig,
    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where recordings are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output directory for recordings and the manifest
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_name() -> String {
    "Vibrations Profile".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/vibrations")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error: defaults and environment variables still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> SweepResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(SweepError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        self.sweep.validate()?;

        let bounds = &self.machine.bounds;
        if bounds.min.x >= bounds.max.x || bounds.min.y >= bounds.max.y {
            return Err(SweepError::Configuration(format!(
                "Machine bounds are empty: min ({}, {}) max ({}, {})",
                bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y
            )));
        }

        let mut ids = HashSet::new();
        for sensor in &self.machine.sensors {
            if !ids.insert(sensor.id.as_str()) {
                return Err(SweepError::Configuration(format!(
                    "Duplicate accelerometer ID: {}",
                    sensor.id
                )));
            }
        }

        if let Some(chip) = self.sweep.accel_chip() {
            if !ids.contains(chip) {
                tracing::warn!(
                    chip,
                    "Requested accelerometer is not attached to the simulated machine"
                );
            }
        }

        Ok(())
    }

    /// Render the effective configuration (file, environment and overrides merged) as TOML
    pub fn to_toml_string(&self) -> SweepResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SweepError::Configuration(format!("Failed to serialize config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::capabilities::AxisHint;
    use crate::hardware::mock::SimulatedSensor;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sweep, SweepConfig::default());
        assert_eq!(config.application.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [application]
            name = "Bench"
            log_level = "debug"

            [sweep]
            size = 80.0
            max_speed = 150.0
            accel_chip = "adxl345"

            [machine]
            kinematics = "corexy"
            cruise_ratio = 0.5

            [[machine.sensors]]
            id = "adxl345"
            axes = ["x", "y", "xy"]

            [export]
            output_dir = "/tmp/vib"
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.name, "Bench");
        assert_eq!(config.sweep.size, 80.0);
        assert_eq!(config.sweep.max_speed, 150.0);
        assert_eq!(config.sweep.speed_increment, 2.0);
        assert_eq!(config.machine.kinematics, "corexy");
        assert_eq!(
            config.machine.sensors,
            vec![SimulatedSensor {
                id: "adxl345".into(),
                axes: vec![AxisHint::A, AxisHint::B, AxisHint::Combined],
            }]
        );
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/vib"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(SweepError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_sweep_is_rejected() {
        let mut config = AppConfig::default();
        config.sweep.size = 10.0;
        assert!(matches!(
            config.validate(),
            Err(SweepError::ParameterOutOfRange { name: "SIZE", .. })
        ));
    }

    #[test]
    fn test_duplicate_sensor_ids() {
        let mut config = AppConfig::default();
        let sensor = SimulatedSensor {
            id: "adxl345".into(),
            axes: vec![AxisHint::A],
        };
        config.machine.sensors = vec![sensor.clone(), sensor];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_a_figment_error() {
        let file = write_config("[sweep]\nsize = \"large\"\n");
        let err = AppConfig::load_from(file.path()).unwrap_err();
        let sweep_err = SweepError::from(err);
        assert!(sweep_err.is_validation());
    }

    #[test]
    fn test_effective_config_renders_as_toml() {
        let mut config = AppConfig::default();
        config.sweep.accel_chip = Some("adxl345".into());

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[sweep]"));
        assert!(!text.contains("cruise_ratio"));
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);

        config.machine.cruise_ratio = Some(0.3);
        let text = config.to_toml_string().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.machine.cruise_ratio, Some(0.3));
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_omitted_cruise_ratio_means_legacy_firmware() {
        let file = write_config(
            r#"
            [machine]
            kinematics = "cartesian"
            max_accel = 5000.0
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.machine.max_accel, 5000.0);
        assert_eq!(config.machine.cruise_ratio, None);
        assert_eq!(config.machine.toolhead_config().limits.cruise_ratio, None);
    }
}
