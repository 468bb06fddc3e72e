//! Measurement data types.
//!
//! An accelerometer capture is a [`Recording`]; every recording taken during a sweep is
//! collected into a [`MeasurementSet`] which is handed to the analysis pipeline at the end.
//! The samples themselves are opaque to the sweep logic: it only moves them around.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    /// Seconds since the start of the capture
    pub time: f64,
    /// Acceleration along X (mm/s²)
    pub x: f64,
    /// Acceleration along Y (mm/s²)
    pub y: f64,
    /// Acceleration along Z (mm/s²)
    pub z: f64,
}

/// A closed accelerometer capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Generated name (angle and speed encoded, sanitized)
    pub name: String,
    /// Whether the name is qualified with the start time for uniqueness
    pub append_time: bool,
    /// When the capture was armed
    pub started_at: DateTime<Utc>,
    /// Captured samples
    pub samples: Vec<AccelSample>,
}

impl Recording {
    /// Name used for files: `name` or `name_YYYYmmdd_HHMMSS` when `append_time` is set.
    pub fn qualified_name(&self) -> String {
        if self.append_time {
            format!("{}_{}", self.name, self.started_at.format("%Y%m%d_%H%M%S"))
        } else {
            self.name.clone()
        }
    }
}

/// Ordered collection of recordings accumulated across a sweep.
///
/// Recordings are keyed by name. Names are not expected to collide; if they do, the later
/// recording replaces the earlier one in place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeasurementSet {
    recordings: Vec<Recording>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MeasurementSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recording, replacing any earlier one with the same name.
    pub fn insert(&mut self, recording: Recording) {
        match self.index.get(&recording.name) {
            Some(&slot) => {
                tracing::warn!(name = %recording.name, "Recording name collision, keeping the latest");
                self.recordings[slot] = recording;
            }
            None => {
                self.index
                    .insert(recording.name.clone(), self.recordings.len());
                self.recordings.push(recording);
            }
        }
    }

    /// Recording by name
    pub fn get(&self, name: &str) -> Option<&Recording> {
        self.index.get(name).map(|&slot| &self.recordings[slot])
    }

    /// Recordings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter()
    }

    /// Recording names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.recordings.iter().map(|r| r.name.as_str()).collect()
    }

    /// Number of recordings
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    /// Whether no recording was collected
    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    /// Total number of samples across all recordings
    pub fn total_samples(&self) -> usize {
        self.recordings.iter().map(|r| r.samples.len()).sum()
    }
}
