//! The immutable result of a fit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use staggered_estimate::{
    Aggregation, Aggregator, Diagnostic, EstimatorConfig, GroupTimeTable, SkipReason,
};
use staggered_inference::{Estimand, Inference, InferenceMethod, InferenceReport};
use staggered_panel::PanelTable;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while assembling a result set.
#[derive(Debug, Error)]
pub enum ResultSetError {
    /// A required builder input was not supplied.
    #[error("Missing builder field: {0}")]
    MissingField(&'static str),

    /// The inference report lacks an estimand present in the table.
    #[error("No inference for {0}")]
    MissingInference(String),
}

/// Point estimate with its inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectRow {
    /// Point estimate.
    pub estimate: f64,

    /// Standard error.
    pub se: f64,

    /// Lower confidence bound.
    pub ci_lower: f64,

    /// Upper confidence bound.
    pub ci_upper: f64,

    /// Two-sided p-value, absent when the variance is degenerate.
    pub p_value: Option<f64>,
}

impl EffectRow {
    /// Combine an estimate with its inference.
    pub const fn new(estimate: f64, inference: &Inference) -> Self {
        Self {
            estimate,
            se: inference.se,
            ci_lower: inference.conf_int.0,
            ci_upper: inference.conf_int.1,
            p_value: inference.p_value,
        }
    }

    /// Whether the p-value is below `alpha`.
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.is_some_and(|p| p < alpha)
    }
}

/// One estimated group-time cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTimeRow {
    /// Cohort.
    pub group: i64,

    /// Calendar period.
    pub time: i64,

    /// `time − group`.
    pub event_time: i64,

    /// Base period of the outcome change.
    pub base_period: i64,

    /// ATT(g,t).
    pub att: f64,

    /// Standard error.
    pub se: f64,

    /// Lower confidence bound.
    pub ci_lower: f64,

    /// Upper confidence bound.
    pub ci_upper: f64,

    /// Two-sided p-value.
    pub p_value: Option<f64>,

    /// Cohort units in the cell.
    pub n_treated: usize,

    /// Control units in the cell.
    pub n_control: usize,

    /// Whether the unadjusted comparison replaced a failed nuisance fit.
    pub fallback: bool,
}

/// One event-study coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStudyRow {
    /// Periods since adoption.
    pub event_time: i64,

    /// Cohort-weighted effect.
    pub estimate: f64,

    /// Standard error.
    pub se: f64,

    /// Lower confidence bound.
    pub ci_lower: f64,

    /// Upper confidence bound.
    pub ci_upper: f64,

    /// Two-sided p-value.
    pub p_value: Option<f64>,

    /// Contributing cohorts.
    pub n_cohorts: usize,

    /// Total size of the contributing cohorts.
    pub total_cohort_size: usize,

    /// Only one cohort contributes.
    pub low_power: bool,
}

/// Average post-adoption effect of one cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    /// Cohort.
    pub group: i64,

    /// Average effect over the cohort's post periods.
    pub estimate: f64,

    /// Standard error.
    pub se: f64,

    /// Lower confidence bound.
    pub ci_lower: f64,

    /// Upper confidence bound.
    pub ci_upper: f64,

    /// Two-sided p-value.
    pub p_value: Option<f64>,

    /// Units in the cohort.
    pub cohort_size: usize,

    /// Post periods averaged.
    pub n_periods: usize,
}

/// A cell without an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCell {
    /// Cohort.
    pub group: i64,

    /// Calendar period.
    pub time: i64,

    /// Why the cell was skipped.
    pub reason: SkipReason,
}

/// Everything one fit produced.
///
/// Created once by [`ResultSetBuilder`]; all accessors are read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    generated_at: DateTime<Utc>,
    config: EstimatorConfig,
    inference_method: InferenceMethod,
    n_units: usize,
    n_periods: usize,
    n_clusters: usize,
    cohort_sizes: BTreeMap<i64, usize>,
    overall: Option<EffectRow>,
    event_study: Vec<EventStudyRow>,
    groups: Vec<GroupRow>,
    group_time: Vec<GroupTimeRow>,
    skipped: Vec<SkippedCell>,
    diagnostics: Vec<Diagnostic>,
}

impl ResultSet {
    /// When the result set was assembled.
    pub const fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Configuration of the fit.
    pub const fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Aggregation mode.
    pub const fn aggregation(&self) -> Aggregation {
        self.config.aggregate
    }

    /// How standard errors were obtained.
    pub const fn inference_method(&self) -> InferenceMethod {
        self.inference_method
    }

    /// Units in the panel.
    pub const fn n_units(&self) -> usize {
        self.n_units
    }

    /// Periods in the panel.
    pub const fn n_periods(&self) -> usize {
        self.n_periods
    }

    /// Inference clusters.
    pub const fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Size of every estimated cohort.
    pub const fn cohort_sizes(&self) -> &BTreeMap<i64, usize> {
        &self.cohort_sizes
    }

    /// Overall effect, absent when aggregation is `none`.
    pub const fn overall(&self) -> Option<&EffectRow> {
        self.overall.as_ref()
    }

    /// Event-study profile, ascending in event time.
    pub fn event_study(&self) -> &[EventStudyRow] {
        &self.event_study
    }

    /// Coefficient at one event time.
    pub fn event_time(&self, event_time: i64) -> Option<&EventStudyRow> {
        self.event_study.iter().find(|r| r.event_time == event_time)
    }

    /// Per-cohort effects.
    pub fn groups(&self) -> &[GroupRow] {
        &self.groups
    }

    /// Estimated cells, ordered by cohort then period.
    pub fn group_time(&self) -> &[GroupTimeRow] {
        &self.group_time
    }

    /// One estimated cell.
    pub fn effect(&self, group: i64, time: i64) -> Option<&GroupTimeRow> {
        self.group_time
            .iter()
            .find(|r| r.group == group && r.time == time)
    }

    /// Cells without an estimate.
    pub fn skipped(&self) -> &[SkippedCell] {
        &self.skipped
    }

    /// Warnings from estimation and inference.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Cells where a nuisance fit failed.
    pub fn n_fallbacks(&self) -> usize {
        self.group_time.iter().filter(|r| r.fallback).count()
    }
}

/// Builder for [`ResultSet`].
#[derive(Debug, Default)]
pub struct ResultSetBuilder<'a> {
    config: Option<EstimatorConfig>,
    panel: Option<&'a PanelTable>,
    table: Option<&'a GroupTimeTable>,
    report: Option<&'a InferenceReport>,
}

impl<'a> ResultSetBuilder<'a> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration of the fit.
    pub fn config(mut self, config: EstimatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the panel the fit ran on.
    pub const fn panel(mut self, panel: &'a PanelTable) -> Self {
        self.panel = Some(panel);
        self
    }

    /// Set the group-time table.
    pub const fn table(mut self, table: &'a GroupTimeTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Set the inference report.
    pub const fn inference(mut self, report: &'a InferenceReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Build the result set.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or the report lacks an
    /// estimand the table implies.
    pub fn build(self) -> Result<ResultSet, ResultSetError> {
        let config = self.config.ok_or(ResultSetError::MissingField("config"))?;
        let panel = self.panel.ok_or(ResultSetError::MissingField("panel"))?;
        let table = self.table.ok_or(ResultSetError::MissingField("table"))?;
        let report = self.report.ok_or(ResultSetError::MissingField("inference"))?;

        let lookup = |estimand: Estimand, estimate: f64| {
            report
                .get(&estimand)
                .map(|inference| EffectRow::new(estimate, inference))
                .ok_or_else(|| ResultSetError::MissingInference(estimand.to_string()))
        };

        let mut group_time = Vec::with_capacity(table.effects().len());
        for effect in table.effects().values() {
            let key = effect.key();
            let row = lookup(
                Estimand::Cell {
                    group: key.group,
                    time: key.time,
                },
                effect.att(),
            )?;
            group_time.push(GroupTimeRow {
                group: key.group,
                time: key.time,
                event_time: key.event_time(),
                base_period: effect.base_period(),
                att: effect.att(),
                se: row.se,
                ci_lower: row.ci_lower,
                ci_upper: row.ci_upper,
                p_value: row.p_value,
                n_treated: effect.n_treated(),
                n_control: effect.n_control(),
                fallback: effect.used_fallback(),
            });
        }

        let overall = if config.aggregate == Aggregation::None {
            None
        } else {
            Aggregator::overall(table)
                .map(|effect| lookup(Estimand::Overall, effect.estimate()))
                .transpose()?
        };

        let mut diagnostics = table.diagnostics().to_vec();

        let mut event_study = Vec::new();
        if config.aggregate == Aggregation::EventStudy {
            let profile = Aggregator::event_study(table);
            diagnostics.extend(Aggregator::low_power_diagnostics(&profile));
            for (event_time, effect) in &profile {
                let row = lookup(Estimand::EventTime(*event_time), effect.estimate())?;
                event_study.push(EventStudyRow {
                    event_time: *event_time,
                    estimate: row.estimate,
                    se: row.se,
                    ci_lower: row.ci_lower,
                    ci_upper: row.ci_upper,
                    p_value: row.p_value,
                    n_cohorts: effect.cohorts().len(),
                    total_cohort_size: effect.total_cohort_size(),
                    low_power: effect.is_low_power(),
                });
            }
        }

        let mut groups = Vec::new();
        if config.aggregate == Aggregation::Group {
            for (group, effect) in Aggregator::by_group(table) {
                let row = lookup(Estimand::Group(group), effect.estimate())?;
                groups.push(GroupRow {
                    group,
                    estimate: row.estimate,
                    se: row.se,
                    ci_lower: row.ci_lower,
                    ci_upper: row.ci_upper,
                    p_value: row.p_value,
                    cohort_size: table.cohort_sizes().get(&group).copied().unwrap_or(0),
                    n_periods: effect.n_cells(),
                });
            }
        }

        diagnostics.extend(report.diagnostics().iter().cloned());

        let skipped = table
            .skipped()
            .iter()
            .map(|(key, &reason)| SkippedCell {
                group: key.group,
                time: key.time,
                reason,
            })
            .collect();

        Ok(ResultSet {
            generated_at: Utc::now(),
            config,
            inference_method: report.method(),
            n_units: panel.n_units(),
            n_periods: panel.n_periods(),
            n_clusters: report.n_clusters(),
            cohort_sizes: table.cohort_sizes().clone(),
            overall,
            event_study,
            groups,
            group_time,
            skipped,
            diagnostics,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use staggered_estimate::GroupTimeEngine;
    use staggered_inference::{InferenceEngine, collect_estimands};
    use staggered_panel::PanelRecord;

    pub(crate) fn panel() -> PanelTable {
        let units = [
            ("a", 3, 1.5, 0.3),
            ("b", 3, 0.5, -0.2),
            ("c", 4, 2.0, 0.1),
            ("d", 4, 1.0, -0.4),
            ("n1", 0, 0.0, 0.2),
            ("n2", 0, 0.7, -0.1),
            ("n3", 0, 1.2, 0.0),
        ];
        let mut records = Vec::new();
        for (unit, first_treat, level, wobble) in units {
            for t in 1..=5i64 {
                let treated = first_treat > 0 && t >= first_treat;
                records.push(PanelRecord {
                    unit: unit.to_string(),
                    time: t,
                    outcome: level
                        + 0.5 * t as f64
                        + if t % 2 == 0 { wobble } else { -wobble }
                        + if treated { 2.0 } else { 0.0 },
                    first_treat,
                    cluster: None,
                    covariates: Vec::new(),
                });
            }
        }
        PanelTable::from_records(records, vec![], 0).unwrap()
    }

    pub(crate) fn result_set(aggregate: Aggregation) -> ResultSet {
        let panel = panel();
        let config = EstimatorConfig {
            aggregate,
            ..EstimatorConfig::default()
        };
        let table = GroupTimeEngine::new(&config).unwrap().estimate(&panel).unwrap();
        let estimands = collect_estimands(&table, aggregate);
        let report = InferenceEngine::new(&config)
            .unwrap()
            .infer(&panel, &estimands)
            .unwrap();
        ResultSetBuilder::new()
            .config(config)
            .panel(&panel)
            .table(&table)
            .inference(&report)
            .build()
            .unwrap()
    }

    #[test]
    fn test_event_study_result_set() {
        let results = result_set(Aggregation::EventStudy);

        assert_eq!(results.n_units(), 7);
        assert_eq!(results.n_periods(), 5);
        assert!(results.overall().is_some());
        assert!(results.groups().is_empty());

        let times: Vec<i64> = results.event_study().iter().map(|r| r.event_time).collect();
        assert_eq!(times, vec![-3, -2, 0, 1, 2]);
        let latest = results.event_time(2).unwrap();
        assert!(latest.low_power);
        assert_eq!(latest.n_cohorts, 1);
        assert!(results.diagnostics().contains(&Diagnostic::LowPowerEventTime { event_time: 2 }));
    }

    #[test]
    fn test_group_time_rows_match_table() {
        let results = result_set(Aggregation::Overall);
        let cell = results.effect(3, 4).unwrap();
        assert_eq!(cell.base_period, 2);
        assert_eq!(cell.event_time, 1);
        assert_eq!(cell.n_treated, 2);
        assert_eq!(cell.n_control, 3);
        assert!(cell.ci_lower <= cell.att && cell.att <= cell.ci_upper);
        assert!(results.event_study().is_empty());
        assert_eq!(results.n_fallbacks(), 0);
    }

    #[test]
    fn test_group_aggregation_rows() {
        let results = result_set(Aggregation::Group);
        assert_eq!(results.groups().len(), 2);
        assert_eq!(results.groups()[0].group, 3);
        assert_eq!(results.groups()[0].n_periods, 3);
        assert_eq!(results.groups()[1].cohort_size, 2);
    }

    #[test]
    fn test_no_aggregation_has_no_overall() {
        let results = result_set(Aggregation::None);
        assert!(results.overall().is_none());
        assert!(!results.group_time().is_empty());
    }

    #[test]
    fn test_overall_estimate() {
        let results = result_set(Aggregation::Overall);
        let overall = results.overall().unwrap();
        // every post cell carries the same effect up to the wobble pattern
        assert!(overall.estimate.is_finite());
        assert!(overall.se > 0.0);
        assert_abs_diff_eq!(
            (overall.ci_lower + overall.ci_upper) / 2.0,
            overall.estimate,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_builder_requires_inputs() {
        let result = ResultSetBuilder::new().config(EstimatorConfig::default()).build();
        assert!(matches!(result, Err(ResultSetError::MissingField("panel"))));
    }
}
