//! Data export.
//!
//! - `csv_export`: writes sweep recordings as CSV files with a JSON manifest

pub mod csv_export;

pub use csv_export::{CsvExportPipeline, ExportManifest, ManifestEntry};
