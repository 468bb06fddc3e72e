//! Accelerometer Registry
//!
//! Central place where attached accelerometers are registered together with the axes they
//! are mounted to measure. The sweep never picks a device itself: it asks the registry
//! through the [`SensorResolver`] capability.
//!
//! # Axis resolution
//!
//! ```text
//! find_device_for_axis(A)  ──► first sensor assigned to "x"
//!                         └─► else first sensor assigned to "xy"
//!                         └─► else None
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let mut registry = SensorRegistry::new();
//! registry.register(Arc::new(bed_adxl), &[AxisHint::B])?;
//! registry.register(Arc::new(toolhead_adxl), &[AxisHint::A, AxisHint::Combined])?;
//!
//! let device = registry.find_device_for_axis(AxisHint::A).await; // toolhead_adxl
//! ```

use crate::hardware::capabilities::{AccelSensor, AxisHint, SensorResolver};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Unique identifier for a registered accelerometer (e.g. "adxl345", "lis2dw toolhead")
pub type DeviceId = String;

/// Information about a registered sensor (returned by list operations)
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    /// Unique identifier
    pub id: DeviceId,
    /// Axes this sensor is assigned to
    pub axes: Vec<AxisHint>,
}

struct RegisteredSensor {
    sensor: Arc<dyn AccelSensor>,
    axes: Vec<AxisHint>,
}

/// Registry of attached accelerometers and their axis assignments.
#[derive(Default)]
pub struct SensorRegistry {
    sensors: HashMap<DeviceId, RegisteredSensor>,
    /// Registration order, used to break ties between sensors on the same axis
    order: Vec<DeviceId>,
}

impl SensorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor for the given axes.
    ///
    /// # Errors
    /// Returns error if a sensor with the same id is already registered.
    pub fn register(&mut self, sensor: Arc<dyn AccelSensor>, axes: &[AxisHint]) -> Result<()> {
        let id = sensor.id().to_string();
        if self.sensors.contains_key(&id) {
            return Err(anyhow!("Accelerometer '{}' is already registered", id));
        }

        tracing::debug!(sensor = %id, ?axes, "Registered accelerometer");
        self.sensors.insert(
            id.clone(),
            RegisteredSensor {
                sensor,
                axes: axes.to_vec(),
            },
        );
        self.order.push(id);
        Ok(())
    }

    /// Unregister a sensor. Returns true if it was found.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.order.retain(|known| known != id);
        self.sensors.remove(id).is_some()
    }

    /// List registered sensors in registration order
    pub fn list_sensors(&self) -> Vec<SensorInfo> {
        self.order
            .iter()
            .filter_map(|id| {
                self.sensors.get(id).map(|s| SensorInfo {
                    id: id.clone(),
                    axes: s.axes.clone(),
                })
            })
            .collect()
    }

    /// Check if a sensor is registered
    pub fn contains(&self, id: &str) -> bool {
        self.sensors.contains_key(id)
    }

    /// Get count of registered sensors
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    fn first_on(&self, axis: AxisHint) -> Option<&DeviceId> {
        self.order.iter().find(|id| {
            self.sensors
                .get(id.as_str())
                .is_some_and(|s| s.axes.contains(&axis))
        })
    }
}

#[async_trait]
impl SensorResolver for SensorRegistry {
    async fn find_device_for_axis(&self, axis: AxisHint) -> Option<String> {
        self.first_on(axis)
            .or_else(|| self.first_on(AxisHint::Combined))
            .cloned()
    }

    async fn get_sensor(&self, device_id: &str) -> Option<Arc<dyn AccelSensor>> {
        self.sensors.get(device_id).map(|s| Arc::clone(&s.sensor))
    }
}
