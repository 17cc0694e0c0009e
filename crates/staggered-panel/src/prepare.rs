//! Panel preparation from a raw dated table.
//!
//! Converts calendar dates into integer day offsets from the earliest date
//! and derives the treatment columns from a caller-supplied map of adoption
//! dates:
//!
//! ```text
//! time         = (date - t0).days
//! first_treat  = (adoption_date - t0).days, sentinel when the unit never adopts
//! ever_treated = 1{unit has an adoption date}
//! treated      = 1{date >= adoption_date}
//! post         = treated
//! ```

use crate::error::{PanelError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Date format accepted for raw dates and adoption dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Configuration for [`prepare_panel`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    /// Column holding the unit identifier
    pub unit_column: String,
    /// Column holding ISO dates
    pub date_column: String,
    /// Column holding the outcome
    pub outcome_column: String,
    /// Adoption date per unit; units absent from the map never adopt
    pub adoption_dates: BTreeMap<String, NaiveDate>,
    /// Optional allow-list of units to keep
    #[serde(default)]
    pub keep_units: Option<BTreeSet<String>>,
    /// Sentinel written into `first_treat` for never-treated units
    #[serde(default)]
    pub never_treated: i64,
}

impl PrepareConfig {
    /// Create a configuration with the given source columns and no adoption dates
    pub fn new(
        unit_column: impl Into<String>,
        date_column: impl Into<String>,
        outcome_column: impl Into<String>,
    ) -> Self {
        Self {
            unit_column: unit_column.into(),
            date_column: date_column.into(),
            outcome_column: outcome_column.into(),
            adoption_dates: BTreeMap::new(),
            keep_units: None,
            never_treated: 0,
        }
    }

    /// Set the adoption dates
    pub fn with_adoption_dates(mut self, dates: BTreeMap<String, NaiveDate>) -> Self {
        self.adoption_dates = dates;
        self
    }

    /// Restrict the output to the given units
    pub fn with_keep_units<I, S>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_units = Some(units.into_iter().map(Into::into).collect());
        self
    }
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|source| PanelError::DateParse {
        value: value.to_string(),
        source,
    })
}

/// Parse a `unit -> date` map given as strings
pub fn parse_adoption_dates(raw: &BTreeMap<String, String>) -> Result<BTreeMap<String, NaiveDate>> {
    raw.iter()
        .map(|(unit, date)| Ok((unit.clone(), parse_date(date)?)))
        .collect()
}

struct PreparedRow {
    unit: String,
    date: NaiveDate,
    outcome: f64,
}

/// Build an estimator-ready panel from a raw dated table.
///
/// # Arguments
/// * `raw` - Table with at least the unit, date and outcome columns
/// * `config` - Source columns, adoption dates and unit filter
///
/// # Returns
/// * DataFrame with columns `unit`, `date`, `time`, `outcome`, `first_treat`,
///   `ever_treated`, `treated` and `post`, sorted by unit then time
pub fn prepare_panel(raw: &DataFrame, config: &PrepareConfig) -> Result<DataFrame> {
    let units = text_column(raw, &config.unit_column)?;
    let dates = text_column(raw, &config.date_column)?;
    let outcomes = raw
        .column(&config.outcome_column)
        .map_err(|_| PanelError::Schema {
            column: config.outcome_column.clone(),
        })?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let outcomes: Vec<Option<f64>> = outcomes.f64()?.into_iter().collect();

    let mut rows = Vec::with_capacity(raw.height());
    let mut dropped = 0usize;
    for (row, ((unit, date), outcome)) in units.into_iter().zip(dates).zip(outcomes).enumerate() {
        let unit = unit.ok_or_else(|| PanelError::MissingValue {
            column: config.unit_column.clone(),
            row,
        })?;
        if config.keep_units.as_ref().is_some_and(|keep| !keep.contains(&unit)) {
            continue;
        }
        let date = date.ok_or_else(|| PanelError::MissingValue {
            column: config.date_column.clone(),
            row,
        })?;
        match outcome {
            Some(outcome) if outcome.is_finite() => rows.push(PreparedRow {
                unit,
                date: parse_date(&date)?,
                outcome,
            }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        log::warn!("Dropped {dropped} rows with a missing outcome");
    }
    let Some(t0) = rows.iter().map(|r| r.date).min() else {
        return Err(PanelError::Empty);
    };

    let mut first_treat_by_unit = BTreeMap::new();
    for (unit, adoption) in &config.adoption_dates {
        let offset = (*adoption - t0).num_days();
        if offset == config.never_treated {
            return Err(PanelError::SentinelAmbiguity {
                sentinel: config.never_treated,
                first_period: 0,
            });
        }
        first_treat_by_unit.insert(unit.as_str(), offset);
    }

    let n = rows.len();
    let mut unit_col = Vec::with_capacity(n);
    let mut date_col = Vec::with_capacity(n);
    let mut time_col = Vec::with_capacity(n);
    let mut outcome_col = Vec::with_capacity(n);
    let mut first_treat_col = Vec::with_capacity(n);
    let mut ever_col = Vec::with_capacity(n);
    let mut treated_col = Vec::with_capacity(n);

    for row in rows {
        let adoption = config.adoption_dates.get(&row.unit);
        let treated = adoption.is_some_and(|d| row.date >= *d);
        first_treat_col.push(
            first_treat_by_unit
                .get(row.unit.as_str())
                .copied()
                .unwrap_or(config.never_treated),
        );
        ever_col.push(i32::from(adoption.is_some()));
        treated_col.push(i32::from(treated));
        time_col.push((row.date - t0).num_days());
        date_col.push(row.date.format(DATE_FORMAT).to_string());
        outcome_col.push(row.outcome);
        unit_col.push(row.unit);
    }

    let df = df!(
        "unit" => unit_col,
        "date" => date_col,
        "time" => time_col,
        "outcome" => outcome_col,
        "first_treat" => first_treat_col,
        "ever_treated" => ever_col,
        "treated" => treated_col.clone(),
        "post" => treated_col,
    )?;

    let sorted = df
        .lazy()
        .sort(["unit", "time"], Default::default())
        .collect()?;

    log::info!(
        "Prepared panel: {} rows, {} units, t0 = {}",
        sorted.height(),
        count_units(&sorted)?,
        t0.format(DATE_FORMAT)
    );
    Ok(sorted)
}

fn count_units(df: &DataFrame) -> Result<usize> {
    Ok(df.column("unit")?.as_materialized_series().n_unique()?)
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)
        .map_err(|_| PanelError::Schema {
            column: name.to_string(),
        })?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}
