//! CSV and JSON export of result tables.

use crate::result::{EventStudyRow, GroupRow, GroupTimeRow, ResultSet};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn rows_to_csv<T: Serialize>(rows: &[T]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn rows_to_string<T: Serialize>(rows: &[T], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => rows_to_csv(rows),
        ExportFormat::Json => Ok(serde_json::to_string(rows)?),
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(rows)?),
    }
}

impl Exporter for Vec<GroupTimeRow> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        rows_to_string(self, format)
    }
}

impl Exporter for Vec<EventStudyRow> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        rows_to_string(self, format)
    }
}

impl Exporter for Vec<GroupRow> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        rows_to_string(self, format)
    }
}

/// CSV gives the group-time table; JSON gives the whole result set.
impl Exporter for ResultSet {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => rows_to_csv(self.group_time()),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

impl ResultSet {
    /// Write the group-time table and any aggregation table into `dir`.
    ///
    /// Files are named `{stem}_group_time.{ext}`, `{stem}_event_study.{ext}`
    /// and `{stem}_groups.{ext}`; empty tables are not written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn export_tables(
        &self,
        dir: &Path,
        stem: &str,
        format: ExportFormat,
    ) -> Result<Vec<PathBuf>, ExportError> {
        let ext = format.extension();
        let mut written = Vec::new();

        let path = dir.join(format!("{stem}_group_time.{ext}"));
        self.group_time().to_vec().export_to_file(&path, format)?;
        written.push(path);

        if !self.event_study().is_empty() {
            let path = dir.join(format!("{stem}_event_study.{ext}"));
            self.event_study().to_vec().export_to_file(&path, format)?;
            written.push(path);
        }
        if !self.groups().is_empty() {
            let path = dir.join(format!("{stem}_groups.{ext}"));
            self.groups().to_vec().export_to_file(&path, format)?;
            written.push(path);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::result_set;
    use staggered_estimate::Aggregation;

    #[test]
    fn test_group_time_csv() {
        let results = result_set(Aggregation::Overall);
        let csv = results.export_to_string(ExportFormat::Csv).unwrap();

        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "group,time,event_time,base_period,att,se,ci_lower,ci_upper,p_value,n_treated,n_control,fallback"
        );
        assert_eq!(lines.count(), results.group_time().len());
    }

    #[test]
    fn test_event_study_csv() {
        let results = result_set(Aggregation::EventStudy);
        let csv = results
            .event_study()
            .to_vec()
            .export_to_string(ExportFormat::Csv)
            .unwrap();
        assert!(csv.starts_with("event_time,estimate,se,ci_lower,ci_upper,p_value"));
        assert!(csv.contains("\n-3,"));
    }

    #[test]
    fn test_result_set_json() {
        let results = result_set(Aggregation::EventStudy);
        let json = results.export_to_string(ExportFormat::Json).unwrap();
        assert!(json.contains("\"generated_at\""));
        assert!(json.contains("\"event_study\""));
        assert!(json.contains("\"control_group\":\"never_treated\""));

        let pretty = results.export_to_string(ExportFormat::PrettyJson).unwrap();
        assert!(pretty.contains("  "));
    }

    #[test]
    fn test_export_tables_to_dir() {
        let results = result_set(Aggregation::EventStudy);
        let dir = std::env::temp_dir().join(format!("staggered-output-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let written = results.export_tables(&dir, "fit", ExportFormat::Csv).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("fit_event_study.csv"));
        let content = std::fs::read_to_string(&written[0]).unwrap();
        assert!(content.starts_with("group,time"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_export_format_extension() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::PrettyJson.extension(), "json");
    }
}
