//! CSV export of sweep recordings.
//!
//! [`CsvExportPipeline`] is an [`AnalysisPipeline`] that does no analysis: it writes every
//! recording to `<output_dir>/<qualified name>.csv` with the columns
//! `time,accel_x,accel_y,accel_z`, plus a `manifest.json` describing the machine and the
//! files, so the captures can be processed offline.
//!
//! Files are written on a blocking task started by `submit`; `await_completion` joins it.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::hardware::capabilities::{AnalysisPipeline, MotorProfile};
use crate::measurement::{MeasurementSet, Recording};
use crate::procedures::kinematics::KinematicsFamily;

/// Name of the manifest written next to the recordings
pub const MANIFEST_FILE: &str = "manifest.json";

/// One exported recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Recording name as generated by the sweep
    pub name: String,
    /// File name relative to the output directory
    pub file: String,
    /// When the capture was armed
    pub started_at: DateTime<Utc>,
    /// Number of rows written
    pub samples: usize,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Kinematics tag of the measured machine
    pub kinematics: String,
    /// Test acceleration (mm/s²)
    pub accel: u32,
    /// Motors involved
    pub motors: Vec<String>,
    /// When the export finished
    pub created_at: DateTime<Utc>,
    /// Exported recordings, in measurement order
    pub recordings: Vec<ManifestEntry>,
}

impl ExportManifest {
    /// Read a manifest back from an export directory
    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }
}

#[derive(Debug, Clone)]
struct MachineDescription {
    kinematics: String,
    accel: u32,
    motors: Vec<String>,
}

#[derive(Default)]
struct ExportState {
    machine: Option<MachineDescription>,
    writer: Option<JoinHandle<Result<ExportManifest>>>,
    manifest: Option<ExportManifest>,
}

/// Analysis pipeline that exports recordings as CSV files.
pub struct CsvExportPipeline {
    output_dir: PathBuf,
    state: Mutex<ExportState>,
}

impl CsvExportPipeline {
    /// Export into `output_dir` (created on submit if missing)
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            state: Mutex::new(ExportState::default()),
        }
    }

    /// Target directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Manifest of the last completed export
    pub async fn manifest(&self) -> Option<ExportManifest> {
        self.state.lock().await.manifest.clone()
    }
}

#[async_trait]
impl AnalysisPipeline for CsvExportPipeline {
    async fn configure(
        &self,
        kinematics: &KinematicsFamily,
        accel: u32,
        motors: &MotorProfile,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.writer.is_some() {
            bail!("Cannot reconfigure while an export is in progress");
        }
        state.machine = Some(MachineDescription {
            kinematics: kinematics.tag().to_string(),
            accel,
            motors: motors.motors.clone(),
        });
        Ok(())
    }

    async fn submit(&self, measurements: MeasurementSet) -> Result<()> {
        let mut state = self.state.lock().await;
        let machine = state
            .machine
            .clone()
            .ok_or_else(|| anyhow!("Export pipeline was not configured before submit"))?;
        if state.writer.is_some() {
            bail!("An export is already in progress");
        }

        let dir = self.output_dir.clone();
        tracing::info!(
            dir = %dir.display(),
            recordings = measurements.len(),
            "Exporting recordings"
        );
        state.writer = Some(tokio::task::spawn_blocking(move || {
            export(&dir, machine, measurements)
        }));
        Ok(())
    }

    async fn await_completion(&self) -> Result<()> {
        let writer = self
            .state
            .lock()
            .await
            .writer
            .take()
            .ok_or_else(|| anyhow!("Nothing was submitted to the export pipeline"))?;

        let manifest = writer
            .await
            .map_err(|e| anyhow!("Export task failed: {}", e))??;

        tracing::info!(
            files = manifest.recordings.len(),
            dir = %self.output_dir.display(),
            "Export complete"
        );
        self.state.lock().await.manifest = Some(manifest);
        Ok(())
    }
}

fn export(
    dir: &Path,
    machine: MachineDescription,
    measurements: MeasurementSet,
) -> Result<ExportManifest> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut entries = Vec::with_capacity(measurements.len());
    for recording in measurements.iter() {
        let file = format!("{}.csv", recording.qualified_name());
        write_recording(&dir.join(&file), recording)?;
        tracing::debug!(file = %file, samples = recording.samples.len(), "Recording written");
        entries.push(ManifestEntry {
            name: recording.name.clone(),
            file,
            started_at: recording.started_at,
            samples: recording.samples.len(),
        });
    }

    let manifest = ExportManifest {
        kinematics: machine.kinematics,
        accel: machine.accel,
        motors: machine.motors,
        created_at: Utc::now(),
        recordings: entries,
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(dir.join(MANIFEST_FILE), json)
        .with_context(|| format!("Failed to write manifest in {}", dir.display()))?;
    Ok(manifest)
}

#[cfg(feature = "storage_csv")]
#[derive(Serialize)]
struct CsvRow {
    time: f64,
    accel_x: f64,
    accel_y: f64,
    accel_z: f64,
}

#[cfg(feature = "storage_csv")]
fn write_recording(path: &Path, recording: &Recording) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    if recording.samples.is_empty() {
        writer.write_record(["time", "accel_x", "accel_y", "accel_z"])?;
    }
    for sample in &recording.samples {
        writer.serialize(CsvRow {
            time: sample.time,
            accel_x: sample.x,
            accel_y: sample.y,
            accel_z: sample.z,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(not(feature = "storage_csv"))]
fn write_recording(_path: &Path, _recording: &Recording) -> Result<()> {
    bail!("CSV export requires the storage_csv feature")
}
