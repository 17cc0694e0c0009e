//! CSV input and output for panels.

use crate::bindings::ColumnBindings;
use crate::error::Result;
use crate::table::PanelTable;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Read a CSV file with a header row into a DataFrame.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    log::debug!("Reading {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Write a DataFrame to a CSV file with a header row.
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Load and validate a panel from a CSV file.
///
/// # Arguments
/// * `path` - CSV file with one row per (unit, period)
/// * `bindings` - Column names for each panel field
///
/// # Returns
/// * Validated panel
pub fn load_panel(path: impl AsRef<Path>, bindings: &ColumnBindings) -> Result<PanelTable> {
    let df = read_csv(path)?;
    let panel = PanelTable::from_dataframe(&df, bindings)?;
    log::info!(
        "Loaded panel with {} units over {} periods ({} cohorts, {} never-treated)",
        panel.n_units(),
        panel.n_periods(),
        panel.cohorts().len(),
        panel.never_treated_units().len()
    );
    Ok(panel)
}
