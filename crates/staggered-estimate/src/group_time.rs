//! Group-time average treatment effects.
//!
//! For cohort `g` (units first treated at `g`) and period `t`:
//! ```text
//! ATT(g, t) = E[Y_t(g) − Y_t(∞) | G = g]
//! base      = g − 1 − k                 (universal)
//!           = previous period of t      (varying, for t < g − k)
//! controls  = {G = ∞}                                 never_treated
//!           ∪ {G = h : h ≠ g, h − k > max(t, base)}   not_yet_treated
//! ```
//! where `k` is the anticipation window. Only units observed at both `t` and
//! the base period enter a cell. Cells are estimated in parallel with
//! read-only access to the panel.
//!
//! # References
//! - Callaway, B. and Sant'Anna, P. H. C. (2021). "Difference-in-Differences
//!   with multiple time periods." Journal of Econometrics, 225(2), 200-230.

use crate::cancel::CancelToken;
use crate::cell::{CellFit, CellRow, CellSample, DidEstimator, estimator_for, unadjusted};
use crate::config::{BasePeriod, ControlGroup, EstimatorConfig};
use crate::diagnostics::{Diagnostic, SkipReason};
use crate::error::EstimateError;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use staggered_panel::{Cohort, PanelTable};
use std::collections::BTreeMap;
use std::fmt;

/// Cohort and calendar period of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupTime {
    /// Adoption period of the cohort
    pub group: i64,
    /// Calendar period
    pub time: i64,
}

impl GroupTime {
    /// Create a key
    pub const fn new(group: i64, time: i64) -> Self {
        Self { group, time }
    }

    /// Periods since adoption, `t − g`
    pub const fn event_time(&self) -> i64 {
        self.time - self.group
    }

    /// Whether `t ≥ g − k` for anticipation window `k`
    pub const fn is_post(&self, anticipation: i64) -> bool {
        self.time >= self.group - anticipation
    }
}

impl fmt::Display for GroupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ATT({},{})", self.group, self.time)
    }
}

/// An estimated cell.
#[derive(Debug, Clone)]
pub struct GroupTimeEffect {
    key: GroupTime,
    base_period: i64,
    att: f64,
    influence: Array1<f64>,
    n_treated: usize,
    n_control: usize,
    fallback: bool,
}

impl GroupTimeEffect {
    /// Cell key
    pub const fn key(&self) -> GroupTime {
        self.key
    }

    /// Base period used for the outcome change
    pub const fn base_period(&self) -> i64 {
        self.base_period
    }

    /// ATT estimate
    pub const fn att(&self) -> f64 {
        self.att
    }

    /// Influence function over all panel units.
    ///
    /// Scaled so that `ATT̂ − ATT ≈ (1/N) Σ ψ_i` with `N` the panel's unit
    /// count; units outside the cell contribute zero.
    pub const fn influence(&self) -> &Array1<f64> {
        &self.influence
    }

    /// Cohort units in the cell
    pub const fn n_treated(&self) -> usize {
        self.n_treated
    }

    /// Control units in the cell
    pub const fn n_control(&self) -> usize {
        self.n_control
    }

    /// Whether a nuisance fit failed and the unadjusted comparison was used
    pub const fn used_fallback(&self) -> bool {
        self.fallback
    }
}

/// All cells of one estimation run.
#[derive(Debug, Clone)]
pub struct GroupTimeTable {
    effects: BTreeMap<GroupTime, GroupTimeEffect>,
    skipped: BTreeMap<GroupTime, SkipReason>,
    cohort_sizes: BTreeMap<i64, usize>,
    unit_cohorts: Vec<Option<i64>>,
    anticipation: i64,
    diagnostics: Vec<Diagnostic>,
}

impl GroupTimeTable {
    /// Estimated cells, ordered by cohort then period
    pub const fn effects(&self) -> &BTreeMap<GroupTime, GroupTimeEffect> {
        &self.effects
    }

    /// A single cell
    pub fn effect(&self, group: i64, time: i64) -> Option<&GroupTimeEffect> {
        self.effects.get(&GroupTime::new(group, time))
    }

    /// Post-period cells, `t ≥ g − k`
    pub fn post_effects(&self) -> impl Iterator<Item = &GroupTimeEffect> {
        self.effects
            .values()
            .filter(|e| e.key.is_post(self.anticipation))
    }

    /// Anticipation window the cells were estimated with
    pub const fn anticipation(&self) -> i64 {
        self.anticipation
    }

    /// Skipped cells and why
    pub const fn skipped(&self) -> &BTreeMap<GroupTime, SkipReason> {
        &self.skipped
    }

    /// Size of every cohort that was estimated
    pub const fn cohort_sizes(&self) -> &BTreeMap<i64, usize> {
        &self.cohort_sizes
    }

    /// Adoption period of every panel unit
    pub fn unit_cohorts(&self) -> &[Option<i64>] {
        &self.unit_cohorts
    }

    /// Number of panel units
    pub fn n_units(&self) -> usize {
        self.unit_cohorts.len()
    }

    /// Warnings raised while estimating
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

struct CellPlan<'a> {
    key: GroupTime,
    base: i64,
    cohort: &'a Cohort,
}

enum CellOutcome {
    Estimated(GroupTimeEffect, Vec<Diagnostic>),
    Skipped(SkipReason, Vec<Diagnostic>),
}

/// Computes ATT(g, t) for every feasible cell.
#[derive(Debug, Clone)]
pub struct GroupTimeEngine {
    config: EstimatorConfig,
    cancel: Option<CancelToken>,
    quiet: bool,
}

impl GroupTimeEngine {
    /// Create an engine after validating the configuration
    pub fn new(config: &EstimatorConfig) -> Result<Self, EstimateError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            cancel: None,
            quiet: false,
        })
    }

    /// Stop between cells once the token is cancelled
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Log per-run warnings at debug level, as for bootstrap replicates
    pub const fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Configuration in use
    pub const fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Estimate every cell of the panel.
    ///
    /// # Returns
    /// * The table of estimated and skipped cells, or an error when no cell
    ///   is feasible or the run was cancelled
    pub fn estimate(&self, panel: &PanelTable) -> Result<GroupTimeTable, EstimateError> {
        let cohorts = panel.cohorts();
        let mut diagnostics = Vec::new();
        let mut skipped = BTreeMap::new();
        let mut cohort_sizes = BTreeMap::new();
        let mut plans = Vec::new();

        if panel.dropped_rows() > 0 {
            diagnostics.push(Diagnostic::RowsDropped {
                count: panel.dropped_rows(),
            });
        }

        for cohort in &cohorts {
            let group = cohort.period();
            if cohort.size() < self.config.min_cohort_size {
                self.warn(format_args!(
                    "Cohort {group} has {} units (minimum {}), skipping",
                    cohort.size(),
                    self.config.min_cohort_size
                ));
                diagnostics.push(Diagnostic::CohortTooSmall {
                    cohort: group,
                    size: cohort.size(),
                    minimum: self.config.min_cohort_size,
                });
                for &time in panel.periods() {
                    skipped.insert(GroupTime::new(group, time), SkipReason::CohortTooSmall);
                }
                continue;
            }
            cohort_sizes.insert(group, cohort.size());

            for &time in panel.periods() {
                let key = GroupTime::new(group, time);
                match self.base_period(panel, group, time) {
                    Some(base) if base == time => {}
                    Some(base) => plans.push(CellPlan { key, base, cohort }),
                    None => {
                        skipped.insert(key, SkipReason::BaseOutsidePanel);
                    }
                }
            }
        }

        let estimator = estimator_for(&self.config);
        let outcomes: Vec<(GroupTime, Option<CellOutcome>)> = plans
            .par_iter()
            .map(|plan| {
                if self.is_cancelled() {
                    return (plan.key, None);
                }
                (plan.key, Some(self.estimate_cell(panel, plan, estimator.as_ref())))
            })
            .collect();

        if self.is_cancelled() {
            return Err(EstimateError::Cancelled);
        }

        let mut effects = BTreeMap::new();
        let mut fallbacks = 0;
        for (key, outcome) in outcomes {
            match outcome {
                Some(CellOutcome::Estimated(effect, notes)) => {
                    fallbacks += usize::from(effect.fallback);
                    diagnostics.extend(notes);
                    effects.insert(key, effect);
                }
                Some(CellOutcome::Skipped(reason, notes)) => {
                    log::debug!("{key} skipped: {reason}");
                    diagnostics.extend(notes);
                    skipped.insert(key, reason);
                }
                None => return Err(EstimateError::Cancelled),
            }
        }

        if fallbacks > 0 {
            self.warn(format_args!(
                "{fallbacks} cells fell back to the unadjusted comparison"
            ));
        }
        if effects.is_empty() {
            return Err(EstimateError::NoFeasibleCells {
                cohorts: cohorts.len(),
                skipped: skipped.len(),
            });
        }

        log::debug!(
            "Estimated {} group-time effects ({} skipped) for {} cohorts",
            effects.len(),
            skipped.len(),
            cohort_sizes.len()
        );

        Ok(GroupTimeTable {
            effects,
            skipped,
            cohort_sizes,
            unit_cohorts: panel.unit_cohorts(),
            anticipation: self.config.anticipation_periods(),
            diagnostics,
        })
    }

    fn warn(&self, message: fmt::Arguments<'_>) {
        if self.quiet {
            log::debug!("{message}");
        } else {
            log::warn!("{message}");
        }
    }

    /// Base period for cell (g, t), `None` when it is not a panel period
    fn base_period(&self, panel: &PanelTable, group: i64, time: i64) -> Option<i64> {
        let k = self.config.anticipation_periods();
        let universal = group - 1 - k;
        match self.config.base_period {
            BasePeriod::Varying if time < group - k => panel.previous_period(time),
            _ => panel.has_period(universal).then_some(universal),
        }
    }

    fn is_control(&self, first_treat: Option<i64>, key: GroupTime, base: i64) -> bool {
        match (first_treat, self.config.control_group) {
            (None, _) => true,
            (Some(_), ControlGroup::NeverTreated) => false,
            (Some(h), ControlGroup::NotYetTreated) => {
                h != key.group && h - self.config.anticipation_periods() > key.time.max(base)
            }
        }
    }

    fn estimate_cell(
        &self,
        panel: &PanelTable,
        plan: &CellPlan<'_>,
        estimator: &dyn DidEstimator,
    ) -> CellOutcome {
        let CellPlan { key, base, cohort } = *plan;
        let mut notes = Vec::new();
        let mut dropped = 0;
        let mut rows = Vec::new();

        let row = |unit: usize, treated: bool| {
            let series = panel.unit(unit);
            Some(CellRow {
                unit,
                treated,
                delta_y: series.outcome_at(key.time)? - series.outcome_at(base)?,
                covariates: series.covariates_at(base)?,
            })
        };

        for &unit in cohort.members() {
            match row(unit, true) {
                Some(r) => rows.push(r),
                None => dropped += 1,
            }
        }
        let n_treated = rows.len();

        for (unit, series) in panel.units().iter().enumerate() {
            if self.is_control(series.first_treat(), key, base) {
                match row(unit, false) {
                    Some(r) => rows.push(r),
                    None => dropped += 1,
                }
            }
        }
        let n_control = rows.len() - n_treated;

        if dropped > 0 {
            log::trace!("{key}: {dropped} units lack period {} or {base}", key.time);
            notes.push(Diagnostic::UnbalancedUnitsDropped {
                group: key.group,
                time: key.time,
                dropped,
            });
        }
        if n_treated == 0 {
            return CellOutcome::Skipped(SkipReason::NoTreatedUnits, notes);
        }
        if n_control == 0 {
            return CellOutcome::Skipped(SkipReason::NoControlUnits, notes);
        }

        let sample = CellSample::from_rows(&rows, panel.n_covariates());

        // intercept-only nuisance fits reproduce the unadjusted comparison
        let fitted = if sample.is_intercept_only() {
            unadjusted(&sample)
        } else {
            estimator.estimate(&sample)
        };

        let (fit, fallback) = match fitted {
            Ok(fit) if is_finite(&fit) => (fit, false),
            other => {
                let reason = match other {
                    Err(e) => e.to_string(),
                    Ok(_) => "non-finite estimate".to_string(),
                };
                log::debug!("{key}: {reason}, using unadjusted comparison");
                notes.push(Diagnostic::NuisanceFallback {
                    group: key.group,
                    time: key.time,
                    reason,
                });
                match unadjusted(&sample) {
                    Ok(fit) => (fit, true),
                    Err(_) => return CellOutcome::Skipped(SkipReason::NoControlUnits, notes),
                }
            }
        };

        let n_units = panel.n_units();
        let scale = n_units as f64 / sample.len() as f64;
        let mut influence = Array1::zeros(n_units);
        for (&unit, &psi) in sample.units().iter().zip(fit.influence.iter()) {
            influence[unit] = psi * scale;
        }

        log::trace!(
            "{key} = {:.6} (base {base}, {n_treated} treated, {n_control} controls)",
            fit.att
        );

        CellOutcome::Estimated(
            GroupTimeEffect {
                key,
                base_period: base,
                att: fit.att,
                influence,
                n_treated,
                n_control,
                fallback,
            },
            notes,
        )
    }
}

fn is_finite(fit: &CellFit) -> bool {
    fit.att.is_finite() && fit.influence.iter().all(|v| v.is_finite())
}
