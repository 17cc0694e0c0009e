//! The validated long-format panel.
//!
//! A [`PanelTable`] stores one [`UnitSeries`] per unit, sorted by unit id,
//! with each series sorted by period. Normalising the layout this way makes
//! every downstream computation independent of the input row order.

use crate::bindings::ColumnBindings;
use crate::cohort::{Cohort, group_cohorts};
use crate::error::{PanelError, Result};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// One raw observation prior to validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRecord {
    /// Unit identifier
    pub unit: String,
    /// Period index
    pub time: i64,
    /// Observed outcome
    pub outcome: f64,
    /// First-treatment period or the never-treated sentinel
    pub first_treat: i64,
    /// Cluster key; `None` clusters on the unit itself
    pub cluster: Option<String>,
    /// Covariate values, in the order of the panel's covariate names
    pub covariates: Vec<f64>,
}

/// The observations of a single unit.
#[derive(Debug, Clone)]
pub struct UnitSeries {
    id: String,
    cluster: usize,
    first_treat: Option<i64>,
    times: Vec<i64>,
    outcomes: Vec<f64>,
    covariates: Vec<Vec<f64>>,
}

impl UnitSeries {
    /// Unit identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Index of the unit's cluster in the owning panel
    pub const fn cluster(&self) -> usize {
        self.cluster
    }

    /// Adoption period, `None` for never-treated units
    pub const fn first_treat(&self) -> Option<i64> {
        self.first_treat
    }

    /// Whether the unit never adopts
    pub const fn is_never_treated(&self) -> bool {
        self.first_treat.is_none()
    }

    /// Observed periods, ascending
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    /// Number of observations
    pub fn n_observations(&self) -> usize {
        self.times.len()
    }

    fn position(&self, time: i64) -> Option<usize> {
        self.times.binary_search(&time).ok()
    }

    /// Whether the unit has a row at `time`
    pub fn observed_at(&self, time: i64) -> bool {
        self.position(time).is_some()
    }

    /// Outcome at `time`
    pub fn outcome_at(&self, time: i64) -> Option<f64> {
        self.position(time).map(|pos| self.outcomes[pos])
    }

    /// Covariate vector at `time`
    pub fn covariates_at(&self, time: i64) -> Option<&[f64]> {
        self.position(time).map(|pos| self.covariates[pos].as_slice())
    }
}

/// A validated staggered-adoption panel.
#[derive(Debug, Clone)]
pub struct PanelTable {
    units: Vec<UnitSeries>,
    periods: Vec<i64>,
    covariate_names: Vec<String>,
    cluster_names: Vec<String>,
    cluster_members: Vec<Vec<usize>>,
    never_treated: i64,
    dropped_rows: usize,
}

impl PanelTable {
    /// Validate raw records into a panel.
    ///
    /// # Arguments
    /// * `records` - Observations in any order
    /// * `covariate_names` - Names matching each record's covariate vector
    /// * `never_treated` - Sentinel `first_treat` value for never-treated units
    ///
    /// # Returns
    /// * The panel, or the first invariant violation found
    pub fn from_records(
        records: Vec<PanelRecord>,
        covariate_names: Vec<String>,
        never_treated: i64,
    ) -> Result<Self> {
        let mut dropped_rows = 0;
        let mut by_unit: BTreeMap<String, Vec<PanelRecord>> = BTreeMap::new();

        for record in records {
            if record.covariates.len() != covariate_names.len() {
                return Err(PanelError::Schema {
                    column: covariate_names
                        .get(record.covariates.len())
                        .cloned()
                        .unwrap_or_else(|| "covariates".to_string()),
                });
            }
            if !record.outcome.is_finite() || record.covariates.iter().any(|v| !v.is_finite()) {
                dropped_rows += 1;
                continue;
            }
            by_unit.entry(record.unit.clone()).or_default().push(record);
        }

        if dropped_rows > 0 {
            log::warn!("Dropped {dropped_rows} rows with missing or non-finite values");
        }
        if by_unit.is_empty() {
            return Err(PanelError::Empty);
        }

        let periods: Vec<i64> = by_unit
            .values()
            .flatten()
            .map(|r| r.time)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let first_period = periods[0];
        if never_treated > first_period && periods.binary_search(&never_treated).is_ok() {
            return Err(PanelError::SentinelAmbiguity {
                sentinel: never_treated,
                first_period,
            });
        }

        let mut cluster_keys = Vec::with_capacity(by_unit.len());
        let mut units = Vec::with_capacity(by_unit.len());
        for (id, mut rows) in by_unit {
            rows.sort_by_key(|r| r.time);

            if let Some(pair) = rows.windows(2).find(|w| w[0].time == w[1].time) {
                return Err(PanelError::DuplicateKey {
                    unit: id,
                    time: pair[0].time,
                });
            }

            let first_treat = rows[0].first_treat;
            if let Some(other) = rows.iter().find(|r| r.first_treat != first_treat) {
                return Err(PanelError::InconsistentCohort {
                    unit: id,
                    first: first_treat,
                    second: other.first_treat,
                });
            }

            let cluster_key = rows[0].cluster.clone().unwrap_or_else(|| id.clone());
            if let Some(other) = rows
                .iter()
                .find(|r| r.cluster.as_ref().is_some_and(|c| *c != cluster_key))
            {
                return Err(PanelError::InconsistentCluster {
                    unit: id,
                    first: cluster_key,
                    second: other.cluster.clone().unwrap_or_default(),
                });
            }

            let first_treat = if first_treat == never_treated {
                None
            } else if periods.binary_search(&first_treat).is_ok() {
                Some(first_treat)
            } else {
                return Err(PanelError::UnknownCohort {
                    unit: id,
                    first_treat,
                });
            };

            let mut times = Vec::with_capacity(rows.len());
            let mut outcomes = Vec::with_capacity(rows.len());
            let mut covariates = Vec::with_capacity(rows.len());
            for row in rows {
                times.push(row.time);
                outcomes.push(row.outcome);
                covariates.push(row.covariates);
            }

            cluster_keys.push(cluster_key);
            units.push(UnitSeries {
                id,
                cluster: 0,
                first_treat,
                times,
                outcomes,
                covariates,
            });
        }

        let cluster_names: Vec<String> = cluster_keys
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut cluster_members = vec![Vec::new(); cluster_names.len()];
        for (idx, (unit, key)) in units.iter_mut().zip(&cluster_keys).enumerate() {
            // cluster_names is sorted and contains every key
            let cluster = cluster_names.binary_search(key).unwrap_or_default();
            unit.cluster = cluster;
            cluster_members[cluster].push(idx);
        }

        log::debug!(
            "Validated panel: {} units, {} periods, {} clusters",
            units.len(),
            periods.len(),
            cluster_names.len()
        );

        Ok(Self {
            units,
            periods,
            covariate_names,
            cluster_names,
            cluster_members,
            never_treated,
            dropped_rows,
        })
    }

    /// Validate a DataFrame into a panel using the given column bindings.
    ///
    /// Nulls in the unit, time, first-treatment or cluster columns are
    /// errors; null outcomes or covariates drop the row.
    pub fn from_dataframe(df: &DataFrame, bindings: &ColumnBindings) -> Result<Self> {
        let units = string_column(df, &bindings.unit)?;
        let times = int_column(df, &bindings.time)?;
        let outcomes = float_column(df, &bindings.outcome)?;
        let first_treats = int_column(df, &bindings.first_treat)?;
        let clusters = bindings
            .cluster
            .as_deref()
            .map(|name| string_column(df, name))
            .transpose()?;
        let covariates = bindings
            .covariates
            .iter()
            .map(|name| float_column(df, name))
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let unit = units[row].clone().ok_or_else(|| missing(&bindings.unit, row))?;
            let time = times[row].ok_or_else(|| missing(&bindings.time, row))?;
            let first_treat = first_treats[row].ok_or_else(|| missing(&bindings.first_treat, row))?;
            let cluster = match (&clusters, bindings.cluster.as_deref()) {
                (Some(values), Some(name)) => {
                    Some(values[row].clone().ok_or_else(|| missing(name, row))?)
                }
                _ => None,
            };

            records.push(PanelRecord {
                unit,
                time,
                outcome: outcomes[row].unwrap_or(f64::NAN),
                first_treat,
                cluster,
                covariates: covariates
                    .iter()
                    .map(|column| column[row].unwrap_or(f64::NAN))
                    .collect(),
            });
        }

        Self::from_records(records, bindings.covariates.clone(), bindings.never_treated)
    }

    /// All units, sorted by id
    pub fn units(&self) -> &[UnitSeries] {
        &self.units
    }

    /// Unit at `index`
    pub fn unit(&self, index: usize) -> &UnitSeries {
        &self.units[index]
    }

    /// Number of units
    pub fn n_units(&self) -> usize {
        self.units.len()
    }

    /// Distinct periods, ascending
    pub fn periods(&self) -> &[i64] {
        &self.periods
    }

    /// Number of distinct periods
    pub fn n_periods(&self) -> usize {
        self.periods.len()
    }

    /// Whether `time` is a panel period
    pub fn has_period(&self, time: i64) -> bool {
        self.periods.binary_search(&time).is_ok()
    }

    /// The panel period immediately before `time`
    pub fn previous_period(&self, time: i64) -> Option<i64> {
        let pos = self.periods.partition_point(|&p| p < time);
        pos.checked_sub(1).map(|idx| self.periods[idx])
    }

    /// Covariate names, in column order
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// Number of covariates
    pub fn n_covariates(&self) -> usize {
        self.covariate_names.len()
    }

    /// Cluster keys, sorted
    pub fn cluster_names(&self) -> &[String] {
        &self.cluster_names
    }

    /// Number of clusters
    pub fn n_clusters(&self) -> usize {
        self.cluster_names.len()
    }

    /// Cluster index of every unit
    pub fn unit_clusters(&self) -> Vec<usize> {
        self.units.iter().map(UnitSeries::cluster).collect()
    }

    /// Adoption period of every unit
    pub fn unit_cohorts(&self) -> Vec<Option<i64>> {
        self.units.iter().map(UnitSeries::first_treat).collect()
    }

    /// The never-treated sentinel
    pub const fn never_treated_value(&self) -> i64 {
        self.never_treated
    }

    /// Rows dropped during validation
    pub const fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Treated cohorts, ascending by adoption period
    pub fn cohorts(&self) -> Vec<Cohort> {
        group_cohorts(&self.units)
    }

    /// Size of every treated cohort
    pub fn cohort_sizes(&self) -> BTreeMap<i64, usize> {
        self.cohorts()
            .into_iter()
            .map(|c| (c.period(), c.size()))
            .collect()
    }

    /// Indices of never-treated units
    pub fn never_treated_units(&self) -> Vec<usize> {
        self.units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.is_never_treated())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Build a panel from drawn clusters.
    ///
    /// Each entry of `draws` is a cluster index; a cluster drawn several
    /// times contributes independent copies of its units, each under its own
    /// unit id and cluster.
    pub fn resample(&self, draws: &[usize]) -> Self {
        let mut units = Vec::new();
        let mut cluster_names = Vec::with_capacity(draws.len());
        let mut cluster_members = Vec::with_capacity(draws.len());

        for (position, &cluster) in draws.iter().enumerate() {
            let mut members = Vec::new();
            for &idx in &self.cluster_members[cluster] {
                let mut unit = self.units[idx].clone();
                unit.id = format!("{}#{position}", unit.id);
                unit.cluster = position;
                members.push(units.len());
                units.push(unit);
            }
            cluster_names.push(format!("{}#{position}", self.cluster_names[cluster]));
            cluster_members.push(members);
        }

        let periods = units
            .iter()
            .flat_map(|u| u.times.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            units,
            periods,
            covariate_names: self.covariate_names.clone(),
            cluster_names,
            cluster_members,
            never_treated: self.never_treated,
            dropped_rows: 0,
        }
    }
}

fn missing(column: &str, row: usize) -> PanelError {
    PanelError::MissingValue {
        column: column.to_string(),
        row,
    }
}

fn bound_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name).map_err(|_| PanelError::Schema {
        column: name.to_string(),
    })
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = bound_column(df, name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = bound_column(df, name)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = bound_column(df, name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(unit: &str, time: i64, outcome: f64, first_treat: i64) -> PanelRecord {
        PanelRecord {
            unit: unit.to_string(),
            time,
            outcome,
            first_treat,
            cluster: None,
            covariates: Vec::new(),
        }
    }

    fn small_panel_records() -> Vec<PanelRecord> {
        vec![
            record("b", 2, 3.0, 2),
            record("a", 1, 1.0, 0),
            record("a", 2, 2.0, 0),
            record("b", 1, 1.5, 2),
            record("c", 1, 0.5, 3),
            record("c", 2, 0.7, 3),
            record("c", 3, 4.0, 3),
        ]
    }

    #[test]
    fn test_from_records_normalises_layout() {
        let panel = PanelTable::from_records(small_panel_records(), vec![], 0).unwrap();

        assert_eq!(panel.n_units(), 3);
        assert_eq!(panel.periods(), &[1, 2, 3]);
        let ids: Vec<&str> = panel.units().iter().map(UnitSeries::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(panel.unit(1).times(), &[1, 2]);
        assert_eq!(panel.unit(1).outcome_at(2), Some(3.0));
        assert_eq!(panel.unit(1).outcome_at(3), None);
        assert!(panel.unit(0).is_never_treated());
        assert_eq!(panel.cohort_sizes(), BTreeMap::from([(2, 1), (3, 1)]));
        assert_eq!(panel.never_treated_units(), vec![0]);
        assert_eq!(panel.n_clusters(), 3);
    }

    #[test]
    fn test_row_order_does_not_matter() {
        let mut shuffled = small_panel_records();
        shuffled.reverse();
        let a = PanelTable::from_records(small_panel_records(), vec![], 0).unwrap();
        let b = PanelTable::from_records(shuffled, vec![], 0).unwrap();

        for (ua, ub) in a.units().iter().zip(b.units()) {
            assert_eq!(ua.id(), ub.id());
            assert_eq!(ua.times(), ub.times());
            assert_eq!(ua.outcome_at(1), ub.outcome_at(1));
        }
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut records = small_panel_records();
        records.push(record("a", 2, 9.0, 0));

        let err = PanelTable::from_records(records, vec![], 0).unwrap_err();
        assert!(matches!(err, PanelError::DuplicateKey { ref unit, time: 2 } if unit == "a"));
    }

    #[test]
    fn test_inconsistent_cohort_rejected() {
        let mut records = small_panel_records();
        records.push(record("a", 3, 2.5, 3));

        let err = PanelTable::from_records(records, vec![], 0).unwrap_err();
        assert!(matches!(err, PanelError::InconsistentCohort { .. }));
    }

    #[test]
    fn test_unknown_cohort_rejected() {
        let records = vec![record("a", 1, 1.0, 0), record("b", 1, 1.0, 7)];

        let err = PanelTable::from_records(records, vec![], 0).unwrap_err();
        assert!(matches!(err, PanelError::UnknownCohort { first_treat: 7, .. }));
    }

    #[rstest]
    #[case(vec![0, 1, 2], 0, true)]
    #[case(vec![1, 2, 3], 0, true)]
    #[case(vec![-1, 0, 1], 0, false)]
    #[case(vec![1, 2, 3], 2, false)]
    #[case(vec![1, 2, 3], -99, true)]
    fn test_sentinel_ambiguity(
        #[case] periods: Vec<i64>,
        #[case] sentinel: i64,
        #[case] accepted: bool,
    ) {
        let records = periods
            .iter()
            .flat_map(|&t| [record("n", t, 0.0, sentinel), record("m", t, 1.0, sentinel)])
            .collect();

        let result = PanelTable::from_records(records, vec![], sentinel);
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(matches!(
                result.unwrap_err(),
                PanelError::SentinelAmbiguity { .. }
            ));
        }
    }

    #[test]
    fn test_non_finite_outcomes_dropped() {
        let mut records = small_panel_records();
        records.push(record("c", 4, f64::NAN, 3));
        records.push(record("a", 4, f64::INFINITY, 0));

        let panel = PanelTable::from_records(records, vec![], 0).unwrap();
        assert_eq!(panel.dropped_rows(), 2);
        assert_eq!(panel.periods(), &[1, 2, 3]);
    }

    #[test]
    fn test_empty_panel_rejected() {
        let records = vec![record("a", 1, f64::NAN, 0)];
        let err = PanelTable::from_records(records, vec![], 0).unwrap_err();
        assert!(matches!(err, PanelError::Empty));
    }

    #[test]
    fn test_clusters_group_units() {
        let mut records = small_panel_records();
        for r in &mut records {
            r.cluster = Some(if r.unit == "c" { "north" } else { "south" }.to_string());
        }

        let panel = PanelTable::from_records(records, vec![], 0).unwrap();
        assert_eq!(panel.cluster_names(), &["north".to_string(), "south".to_string()]);
        assert_eq!(panel.unit_clusters(), vec![1, 1, 0]);
    }

    #[test]
    fn test_resample_duplicates_get_distinct_ids() {
        let panel = PanelTable::from_records(small_panel_records(), vec![], 0).unwrap();
        let resampled = panel.resample(&[2, 2, 0]);

        assert_eq!(resampled.n_units(), 3);
        assert_eq!(resampled.n_clusters(), 3);
        assert_eq!(resampled.unit(0).id(), "c#0");
        assert_eq!(resampled.unit(1).id(), "c#1");
        assert_eq!(resampled.unit(2).id(), "a#2");
        assert_eq!(resampled.unit_clusters(), vec![0, 1, 2]);
        assert_eq!(resampled.cohort_sizes(), BTreeMap::from([(3, 2)]));
    }

    #[test]
    fn test_previous_period() {
        let panel = PanelTable::from_records(small_panel_records(), vec![], 0).unwrap();
        assert_eq!(panel.previous_period(3), Some(2));
        assert_eq!(panel.previous_period(1), None);
    }

    #[test]
    fn test_from_dataframe() {
        let df = df!(
            "id" => ["a", "a", "b", "b"],
            "t" => [1i64, 2, 1, 2],
            "y" => [Some(1.0), Some(2.0), Some(1.0), None],
            "g" => [0i64, 0, 2, 2],
            "x" => [0.1, 0.2, 0.3, 0.4],
        )
        .unwrap();
        let bindings = ColumnBindings {
            outcome: "y".into(),
            unit: "id".into(),
            time: "t".into(),
            first_treat: "g".into(),
            cluster: None,
            covariates: vec!["x".into()],
            never_treated: 0,
        };

        let panel = PanelTable::from_dataframe(&df, &bindings).unwrap();
        assert_eq!(panel.n_units(), 2);
        assert_eq!(panel.dropped_rows(), 1);
        assert_eq!(panel.unit(0).covariates_at(2), Some([0.2].as_slice()));
        assert_eq!(panel.unit(1).first_treat(), Some(2));
    }

    #[test]
    fn test_from_dataframe_missing_column() {
        let df = df!("unit" => ["a"], "time" => [1i64], "outcome" => [1.0]).unwrap();
        let err = PanelTable::from_dataframe(&df, &ColumnBindings::default()).unwrap_err();
        assert!(matches!(err, PanelError::Schema { ref column } if column == "first_treat"));
    }

    #[test]
    fn test_from_dataframe_null_key() {
        let df = df!(
            "unit" => [Some("a"), None],
            "time" => [1i64, 1],
            "outcome" => [1.0, 2.0],
            "first_treat" => [0i64, 0],
        )
        .unwrap();
        let err = PanelTable::from_dataframe(&df, &ColumnBindings::default()).unwrap_err();
        assert!(matches!(err, PanelError::MissingValue { row: 1, .. }));
    }
}
